//! Exit codes for the claimgate CLI. Part of the public contract.

use claimgate_core::PolicyError;

pub const SUCCESS: i32 = 0;
pub const CONFIG_ERROR: i32 = 1; // Bad arguments, unreadable files, invalid config
pub const MALFORMED_IDENTITY: i32 = 2; // Token or geometry could not be parsed
pub const ACCESS_DENIED: i32 = 3; // Claims do not satisfy the policy
pub const NEGOTIATION_FAILED: i32 = 4;

pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PolicyError>() {
        Some(PolicyError::TokenDecode { .. } | PolicyError::GeometryParse { .. }) => {
            MALFORMED_IDENTITY
        }
        Some(PolicyError::AccessDenied { .. }) => ACCESS_DENIED,
        Some(PolicyError::Negotiation { .. }) => NEGOTIATION_FAILED,
        Some(PolicyError::Config { .. }) | None => CONFIG_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_agree_with_core() {
        let errors = [
            PolicyError::config("bad"),
            PolicyError::token_decode("bad"),
            PolicyError::geometry_parse("POINT(", "eof"),
            PolicyError::AccessDenied {
                reason: "role".to_string(),
            },
            PolicyError::Negotiation {
                message: "down".to_string(),
            },
        ];
        for err in errors {
            let expected = err.exit_code();
            assert_eq!(for_error(&anyhow::Error::new(err)), expected);
        }
    }

    #[test]
    fn test_foreign_errors_are_config_errors() {
        let err = anyhow::anyhow!("failed to read request demo.json");
        assert_eq!(for_error(&err), CONFIG_ERROR);
    }
}
