use serde::{Deserialize, Serialize};

use crate::parsers::po::{self, PoError, PoFile};

fn default_domain() -> String {
    "django".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub id: u64,

    pub project_id: u64,

    pub language_code: String,

    #[serde(default = "default_domain")]
    pub domain: String,

    #[serde(default)]
    pub pofile: String,

    /// Bumped by the store on every write.
    #[serde(default)]
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCatalog {
    pub project_id: u64,
    pub language_code: String,
    pub domain: String,
    pub pofile: String,
}

impl Catalog {
    pub fn po(&self) -> Result<PoFile, PoError> {
        po::parse(&self.pofile)
    }

    pub fn set_po(&mut self, po: &PoFile) {
        self.pofile = po.to_string();
    }

    pub fn reference(&self) -> CatalogRef {
        CatalogRef {
            catalog_id: self.id,
            project_id: self.project_id,
            language_code: self.language_code.clone(),
            domain: self.domain.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogRef {
    pub catalog_id: u64,
    pub project_id: u64,
    pub language_code: String,
    pub domain: String,
}
