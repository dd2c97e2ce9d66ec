//! Script source as stored in a host project: a little-endian `i32` byte
//! length followed by the UTF-8 text.

/// Lengths at or above this decode as "no script".
pub const MAX_SCRIPT_BYTES: usize = 1024 * 1024;

const LENGTH_PREFIX: usize = std::mem::size_of::<i32>();

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("state blob is missing its length prefix")]
    MissingLength,
    #[error("state blob is truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("script source is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("script source of {0} bytes is too large to store")]
    TooLarge(usize),
}

pub fn encode_state(source: &str) -> Result<Vec<u8>, StateError> {
    if source.len() >= MAX_SCRIPT_BYTES {
        return Err(StateError::TooLarge(source.len()));
    }
    let mut blob = Vec::with_capacity(LENGTH_PREFIX + source.len());
    blob.extend_from_slice(&(source.len() as i32).to_le_bytes());
    blob.extend_from_slice(source.as_bytes());
    Ok(blob)
}

pub fn decode_state(blob: &[u8]) -> Result<String, StateError> {
    let (prefix, payload) = blob
        .split_first_chunk::<LENGTH_PREFIX>()
        .ok_or(StateError::MissingLength)?;
    let length = i32::from_le_bytes(*prefix);

    if length <= 0 || length as usize >= MAX_SCRIPT_BYTES {
        return Ok(String::new());
    }

    let length = length as usize;
    if payload.len() < length {
        return Err(StateError::Truncated {
            expected: length,
            found: payload.len(),
        });
    }

    Ok(String::from_utf8(payload[..length].to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_length_then_bytes() {
        let blob = encode_state("ctx.log('hi')").unwrap();
        assert_eq!(&blob[..4], &13i32.to_le_bytes());
        assert_eq!(&blob[4..], b"ctx.log('hi')");
        assert_eq!(decode_state(&blob).unwrap(), "ctx.log('hi')");
    }

    #[test]
    fn empty_and_out_of_range_lengths_mean_no_script() {
        assert_eq!(decode_state(&0i32.to_le_bytes()).unwrap(), "");
        assert_eq!(decode_state(&(-5i32).to_le_bytes()).unwrap(), "");
        assert_eq!(
            decode_state(&(MAX_SCRIPT_BYTES as i32).to_le_bytes()).unwrap(),
            ""
        );
    }

    #[test]
    fn short_blobs_are_errors() {
        assert_eq!(decode_state(&[1, 0]), Err(StateError::MissingLength));

        let mut blob = 10i32.to_le_bytes().to_vec();
        blob.extend_from_slice(b"abc");
        assert_eq!(
            decode_state(&blob),
            Err(StateError::Truncated {
                expected: 10,
                found: 3
            })
        );
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut blob = 2i32.to_le_bytes().to_vec();
        blob.extend_from_slice(&[0xC3, 0x28]);
        assert!(matches!(decode_state(&blob), Err(StateError::InvalidUtf8(_))));
    }
}
