//! The location record carried inside encrypted messages.
//!
//! The relay never decodes this; senders encode it, encrypt the result to the
//! recipient, and recipients decode after decryption. The layout is a fixed
//! 56-byte big-endian record:
//!
//! ```text
//! offset  field      type
//!      0  time       i64   (milliseconds since the Unix epoch)
//!      8  accuracy   f64
//!     16  latitude   f64
//!     24  longitude  f64
//!     32  altitude   f64
//!     40  bearing    f64
//!     48  speed      f64
//! ```

use crate::WireError;

/// Encoded length of a [`Location`] in bytes.
pub const LOCATION_LEN: usize = 8 * 7;

/// A single location fix.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Location {
    /// Milliseconds since the Unix epoch.
    pub time: i64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters.
    pub altitude: f64,
    /// Bearing in degrees.
    pub bearing: f64,
    /// Speed in meters per second.
    pub speed: f64,
}

impl Location {
    /// Encode to the fixed big-endian wire record.
    pub fn encode(&self) -> [u8; LOCATION_LEN] {
        let mut out = [0u8; LOCATION_LEN];
        out[0..8].copy_from_slice(&self.time.to_be_bytes());

        let floats = [
            self.accuracy,
            self.latitude,
            self.longitude,
            self.altitude,
            self.bearing,
            self.speed,
        ];
        for (chunk, value) in out[8..].chunks_exact_mut(8).zip(floats) {
            chunk.copy_from_slice(&value.to_bits().to_be_bytes());
        }
        out
    }

    /// Decode a wire record.
    ///
    /// Fails unless `bytes` is exactly [`LOCATION_LEN`] long.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let record: &[u8; LOCATION_LEN] =
            bytes.try_into().map_err(|_| WireError::BufferTooShort {
                expected: LOCATION_LEN,
                actual: bytes.len(),
            })?;

        let word = |idx: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&record[idx * 8..idx * 8 + 8]);
            buf
        };
        let float = |idx: usize| f64::from_bits(u64::from_be_bytes(word(idx)));

        Ok(Self {
            time: i64::from_be_bytes(word(0)),
            accuracy: float(1),
            latitude: float(2),
            longitude: float(3),
            altitude: float(4),
            bearing: float(5),
            speed: float(6),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Location {
        Location {
            time: 1_700_000_000_123,
            accuracy: 4.5,
            latitude: 55.676_098,
            longitude: 12.568_337,
            altitude: -3.25,
            bearing: 271.0,
            speed: 1.4,
        }
    }

    #[test]
    fn roundtrip_is_bit_exact() {
        let loc = Location {
            time: -1,
            accuracy: f64::MIN_POSITIVE,
            latitude: -0.0,
            longitude: f64::INFINITY,
            altitude: f64::MAX,
            bearing: f64::from_bits(0x7ff8_0000_0000_0001),
            speed: 1e-300,
        };
        let decoded = Location::decode(&loc.encode()).unwrap();

        assert_eq!(decoded.time, loc.time);
        for (a, b) in [
            (decoded.accuracy, loc.accuracy),
            (decoded.latitude, loc.latitude),
            (decoded.longitude, loc.longitude),
            (decoded.altitude, loc.altitude),
            (decoded.bearing, loc.bearing),
            (decoded.speed, loc.speed),
        ] {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn encoding_is_big_endian_in_field_order() {
        let bytes = sample().encode();
        assert_eq!(bytes.len(), LOCATION_LEN);
        assert_eq!(&bytes[0..8], &1_700_000_000_123i64.to_be_bytes());
        assert_eq!(&bytes[8..16], &4.5f64.to_be_bytes());
        assert_eq!(&bytes[48..56], &1.4f64.to_be_bytes());
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let bytes = sample().encode();

        assert_eq!(
            Location::decode(&bytes[..55]),
            Err(WireError::BufferTooShort {
                expected: 56,
                actual: 55
            })
        );

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(Location::decode(&long).is_err());
        assert!(Location::decode(&[]).is_err());
    }
}
