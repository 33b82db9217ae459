//! Request validation helpers.

use crate::error::{BridgeError, Result};

/// Require a non-empty parameter value.
///
/// HTTP handlers flatten absent body fields to empty strings, so missing
/// and blank parameters produce the same error.
pub fn require_param(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BridgeError::validation(format!(
            "Missing required parameter: {name}"
        )));
    }
    Ok(())
}

/// Require a dotted-quad host address.
///
/// Accepts four groups of 1-3 digits. Deliberately permissive about octet
/// ranges, matching the shape check the service has always applied.
pub fn require_dotted_quad(host: &str) -> Result<()> {
    if is_dotted_quad(host) {
        Ok(())
    } else {
        Err(BridgeError::validation(format!(
            "Invalid IP address format: {host}"
        )))
    }
}

fn is_dotted_quad(host: &str) -> bool {
    let groups: Vec<&str> = host.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Validate and normalize a pairing code: exactly six ASCII alphanumerics,
/// case-insensitive, uppercased before transmission.
pub fn normalize_pairing_code(code: &str) -> Result<String> {
    let ok = code.len() == 6 && code.bytes().all(|b| b.is_ascii_alphanumeric());
    if !ok {
        return Err(BridgeError::validation(
            "Code must be exactly 6 characters (letters or numbers)",
        ));
    }
    Ok(code.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_param_present() {
        assert!(require_param("dev-1", "deviceId").is_ok());
    }

    #[test]
    fn test_require_param_missing_or_blank() {
        for value in ["", "   "] {
            let err = require_param(value, "deviceId").unwrap_err();
            assert_eq!(err.to_string(), "Missing required parameter: deviceId");
        }
    }

    #[test]
    fn test_dotted_quad_accepts_ipv4_looking_hosts() {
        for host in [
            "192.168.1.50",
            "10.0.0.1",
            "1.2.3.4",
            "255.255.255.255",
            // Shape check only: out-of-range octets still pass.
            "999.999.999.999",
        ] {
            assert!(require_dotted_quad(host).is_ok(), "should accept {host}");
        }
    }

    #[test]
    fn test_dotted_quad_rejects_everything_else() {
        for host in [
            "",
            "tv.local",
            "192.168.1",
            "192.168.1.50.1",
            "192.168.1.",
            ".168.1.50",
            "192.168.1.abc",
            "192.168.1.1234",
            "fe80::1",
            "192,168,1,50",
            "192.168.1.50 ",
        ] {
            let err = require_dotted_quad(host).unwrap_err();
            assert!(
                err.to_string().contains("Invalid IP address format"),
                "should reject {host:?}"
            );
        }
    }

    #[test]
    fn test_pairing_code_accepted_and_uppercased() {
        assert_eq!(normalize_pairing_code("ab12cd").unwrap(), "AB12CD");
        assert_eq!(normalize_pairing_code("AB12CD").unwrap(), "AB12CD");
        assert_eq!(normalize_pairing_code("123456").unwrap(), "123456");
        assert_eq!(normalize_pairing_code("abcdef").unwrap(), "ABCDEF");
    }

    #[test]
    fn test_pairing_code_rejected() {
        for code in ["", "abc12", "abc1234", "ab 2cd", "ab-2cd", "ab12cé", "ÀB12CD"] {
            let err = normalize_pairing_code(code).unwrap_err();
            assert!(
                err.to_string().contains("exactly 6 characters"),
                "should reject {code:?}"
            );
        }
    }
}
