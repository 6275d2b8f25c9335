pub mod error;
pub mod ports;
pub mod static_catalog;
pub mod types;

pub use error::{CatalogError, CatalogErrorKind};
pub use ports::{MedicineCatalogPort, SymptomCatalogPort};
pub use static_catalog::StaticCatalog;
pub use types::{
    DEFAULT_AUDIO_CUE, MedicineId, MedicineInfo, SymptomClass, SymptomDefinition, SymptomFlags,
    SymptomId,
};
