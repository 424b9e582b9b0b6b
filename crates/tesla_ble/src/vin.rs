//! VIN validation and the BLE advertisement local-name prefix derived from it.

use tesla_ble_common::crypto::sha1;

use crate::error::ConfigError;

/// A validated 17-character vehicle identification number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vin(String);

impl Vin {
    pub fn new(vin: impl Into<String>) -> Result<Self, ConfigError> {
        let vin = vin.into();
        if vin.len() != 17 || !vin.is_ascii() {
            return Err(ConfigError::InvalidVin(vin));
        }
        Ok(Vin(vin))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// `"S" || lowercase_hex(SHA1(VIN))[0..16] || "C"`, exactly 17 characters.
    pub fn advertised_name_prefix(&self) -> String {
        let digest = sha1(self.0.as_bytes());
        let hex = hex::encode(digest);
        format!("S{}C", &hex[0..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(Vin::new("TOOSHORT").is_err());
        assert!(Vin::new("5YJ3E1EA7JF0000001").is_err());
    }

    #[test]
    fn advertised_prefix_matches_known_vector() {
        let vin = Vin::new("5YJ3E1EA7JF000000").unwrap();
        let prefix = vin.advertised_name_prefix();

        assert_eq!(prefix.len(), 17);
        assert!(prefix.starts_with('S'));
        assert!(prefix.ends_with('C'));

        let digest = sha1(b"5YJ3E1EA7JF000000");
        let expected = format!("S{}C", &hex::encode(digest)[0..16]);
        assert_eq!(prefix, expected);
    }
}
