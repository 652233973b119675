use std::fmt;

pub const APP_DATA_SIZE: usize = 64;

/// Caller supplied data bound into a quote, always exactly 64 bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AppData([u8; APP_DATA_SIZE]);

impl AppData {
    /// Decodes a hex string and normalizes it to 64 bytes.
    ///
    /// Short input is zero-padded on the right, long input is truncated.
    pub fn from_hex(input: &str) -> Result<Self, hex::FromHexError> {
        let decoded = hex::decode(input)?;
        Ok(Self::from_slice(&decoded))
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut data = [0u8; APP_DATA_SIZE];
        let len = bytes.len().min(APP_DATA_SIZE);
        data[..len].copy_from_slice(&bytes[..len]);
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; APP_DATA_SIZE] {
        &self.0
    }
}

impl fmt::Debug for AppData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppData({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_length_input_is_kept() {
        let app_data = AppData::from_hex(&"ab".repeat(64)).unwrap();
        assert_eq!(app_data.as_bytes(), &[0xab; 64]);
    }

    #[test]
    fn short_input_is_zero_padded() {
        let app_data = AppData::from_hex("0102ff").unwrap();
        let mut expected = [0u8; 64];
        expected[..3].copy_from_slice(&[0x01, 0x02, 0xff]);
        assert_eq!(app_data.as_bytes(), &expected);
    }

    #[test]
    fn empty_input_is_all_zeroes() {
        assert_eq!(AppData::from_hex("").unwrap().as_bytes(), &[0u8; 64]);
    }

    #[test]
    fn long_input_is_truncated() {
        let input = format!("{}{}", "11".repeat(64), "22".repeat(36));
        let app_data = AppData::from_hex(&input).unwrap();
        assert_eq!(app_data.as_bytes(), &[0x11; 64]);
    }

    #[test]
    fn normalization_is_deterministic_across_lengths() {
        for len in 0..=100usize {
            let input: String = (0..len).map(|i| format!("{:02x}", i as u8)).collect();
            let first = AppData::from_hex(&input).unwrap();
            let second = AppData::from_hex(&input).unwrap();
            assert_eq!(first, second);

            let kept = len.min(64);
            for (i, byte) in first.as_bytes().iter().enumerate() {
                let expected = if i < kept { i as u8 } else { 0 };
                assert_eq!(*byte, expected, "byte {i} for input of {len} bytes");
            }
        }
    }

    #[test]
    fn invalid_hex_is_rejected() {
        assert!(AppData::from_hex("abc").is_err());
        assert!(AppData::from_hex("zz").is_err());
        assert!(AppData::from_hex("0x00").is_err());
    }
}
