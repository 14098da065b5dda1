use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Component already registered: {0}")]
    DuplicateComponent(String),

    #[error("Species not registered with the environment: {0}")]
    UnregisteredSpecies(String),

    #[error("Molar mass unknown for species: {0}")]
    UnknownMolarMass(String),

    #[error("Invalid phase name: {0}")]
    InvalidPhase(String),

    #[error("Invalid block kind: {0}")]
    InvalidBlockKind(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::UnregisteredSpecies("Argon".to_string());
        assert!(error.to_string().contains("Argon"));
    }
}
