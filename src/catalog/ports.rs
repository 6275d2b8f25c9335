use crate::catalog::{
    error::CatalogError,
    types::{MedicineId, MedicineInfo, SymptomDefinition, SymptomId},
};

pub trait SymptomCatalogPort: Send + Sync {
    fn get_symptom(&self, symptom_id: SymptomId) -> Result<SymptomDefinition, CatalogError>;

    fn list_symptoms(&self) -> Vec<SymptomDefinition>;
}

pub trait MedicineCatalogPort: Send + Sync {
    fn get_medicine(&self, medicine_id: &MedicineId) -> Result<MedicineInfo, CatalogError>;

    fn medicine_for_slot(&self, slot: u8) -> Option<MedicineInfo>;
}
