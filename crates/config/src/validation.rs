use cropbatch_errors::{CropbatchError, CropbatchResult};

/// Validation hook every config section implements; `AppConfig::validate`
/// fans out to the sections.
pub trait ConfigValidator {
    fn validate(&self) -> CropbatchResult<()>;
}

pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field: &str) -> CropbatchResult<()> {
        if value.trim().is_empty() {
            return Err(CropbatchError::config_error(format!(
                "{field} must not be empty"
            )));
        }
        Ok(())
    }

    pub fn validate_positive(value: f64, field: &str) -> CropbatchResult<()> {
        if !(value > 0.0 && value.is_finite()) {
            return Err(CropbatchError::config_error(format!(
                "{field} must be a positive number, got {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_timeout_ms(value: u64, field: &str) -> CropbatchResult<()> {
        if value == 0 {
            return Err(CropbatchError::config_error(format!(
                "{field} must be greater than 0"
            )));
        }
        Ok(())
    }
}
