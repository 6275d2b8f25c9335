use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::catalog::{
    error::{CatalogError, invalid_catalog, not_found, unavailable},
    ports::{MedicineCatalogPort, SymptomCatalogPort},
    types::{MedicineId, MedicineInfo, SymptomDefinition, SymptomId},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub medicines: Vec<MedicineInfo>,
    #[serde(default)]
    pub symptoms: Vec<SymptomDefinition>,
}

/// Reference data loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    symptoms: BTreeMap<SymptomId, SymptomDefinition>,
    medicines: BTreeMap<MedicineId, MedicineInfo>,
}

impl StaticCatalog {
    pub fn new(
        symptoms: Vec<SymptomDefinition>,
        medicines: Vec<MedicineInfo>,
    ) -> Result<Self, CatalogError> {
        let mut medicine_index = BTreeMap::new();
        let mut slots = BTreeSet::new();
        for medicine in medicines {
            if medicine.slot == 0 {
                return Err(invalid_catalog(format!(
                    "medicine '{}' has slot 0; slots start at 1",
                    medicine.id
                )));
            }
            if !slots.insert(medicine.slot) {
                return Err(invalid_catalog(format!(
                    "slot {} is assigned to more than one medicine",
                    medicine.slot
                )));
            }
            let id = medicine.id.clone();
            if medicine_index.insert(id.clone(), medicine).is_some() {
                return Err(invalid_catalog(format!("duplicate medicine id '{id}'")));
            }
        }

        let mut symptom_index = BTreeMap::new();
        for symptom in symptoms {
            if let Some(medicine_id) = &symptom.suggested_medicine
                && !medicine_index.contains_key(medicine_id)
            {
                return Err(invalid_catalog(format!(
                    "symptom {} suggests unknown medicine '{}'",
                    symptom.id, medicine_id
                )));
            }
            let id = symptom.id;
            if symptom_index.insert(id, symptom).is_some() {
                return Err(invalid_catalog(format!("duplicate symptom id {id}")));
            }
        }

        Ok(Self {
            symptoms: symptom_index,
            medicines: medicine_index,
        })
    }

    pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        Self::new(document.symptoms, document.medicines)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path).map_err(|err| {
            unavailable(format!("failed to read catalog '{}': {err}", path.display()))
        })?;
        let document: CatalogDocument = json5::from_str(&content).map_err(|err| {
            invalid_catalog(format!("failed to parse catalog '{}': {err}", path.display()))
        })?;
        Self::from_document(document)
    }

    pub fn max_slot(&self) -> Option<u8> {
        self.medicines.values().map(|medicine| medicine.slot).max()
    }
}

impl SymptomCatalogPort for StaticCatalog {
    fn get_symptom(&self, symptom_id: SymptomId) -> Result<SymptomDefinition, CatalogError> {
        self.symptoms
            .get(&symptom_id)
            .cloned()
            .ok_or_else(|| not_found(format!("symptom {symptom_id} is not in the catalog")))
    }

    fn list_symptoms(&self) -> Vec<SymptomDefinition> {
        self.symptoms.values().cloned().collect()
    }
}

impl MedicineCatalogPort for StaticCatalog {
    fn get_medicine(&self, medicine_id: &MedicineId) -> Result<MedicineInfo, CatalogError> {
        self.medicines
            .get(medicine_id)
            .cloned()
            .ok_or_else(|| not_found(format!("medicine '{medicine_id}' is not in the catalog")))
    }

    fn medicine_for_slot(&self, slot: u8) -> Option<MedicineInfo> {
        self.medicines
            .values()
            .find(|medicine| medicine.slot == slot)
            .cloned()
    }
}
