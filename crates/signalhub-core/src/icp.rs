use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Ideal-customer-profile filter applied by the classification engine.
///
/// Passed explicitly into every classification run; the server keeps the
/// current value in a single store row and falls back to the YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IcpConfig {
    pub target_country: String,
    pub excluded_hq_countries: Vec<String>,
    pub min_job_title_level: Option<String>,
    pub required_languages: Vec<String>,
    pub max_employees_in_target_country: Option<i32>,
    pub industries: Vec<String>,
    pub min_funding_amount: Option<f64>,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            target_country: "Brazil".to_string(),
            excluded_hq_countries: vec!["Brazil".to_string()],
            min_job_title_level: Some("Director".to_string()),
            required_languages: vec!["Portuguese".to_string(), "English".to_string()],
            max_employees_in_target_country: Some(100),
            industries: vec![
                "Technology".to_string(),
                "SaaS".to_string(),
                "Oil & Energy".to_string(),
            ],
            min_funding_amount: Some(1_000_000.0),
        }
    }
}

impl IcpConfig {
    /// Whether `country` is in `excluded_hq_countries` (case-insensitive).
    #[must_use]
    pub fn excludes_hq_country(&self, country: &str) -> bool {
        self.excluded_hq_countries
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(country.trim()))
    }

    /// Whether `industry` matches any configured industry.
    ///
    /// A configured entry matches when it appears as a case-insensitive
    /// substring of `industry`. An empty industry list accepts everything.
    #[must_use]
    pub fn accepts_industry(&self, industry: &str) -> bool {
        if self.industries.is_empty() {
            return true;
        }
        let industry = industry.to_lowercase();
        self.industries
            .iter()
            .any(|i| industry.contains(&i.to_lowercase()))
    }
}

/// Load an ICP configuration from a YAML file.
///
/// # Errors
///
/// Returns [`ConfigError::IcpFileIo`] if the file cannot be read, or
/// [`ConfigError::IcpFileParse`] if it is not valid YAML for [`IcpConfig`].
pub fn load_icp_config(path: &Path) -> Result<IcpConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IcpFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_yaml::from_str(&content).map_err(|e| ConfigError::IcpFileParse {
        path: path.display().to_string(),
        source: e,
    })
}
