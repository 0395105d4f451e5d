use anyhow::{Result, anyhow};
use encoding::DecoderTrap;
use encoding::label::encoding_from_whatwg_label;

/// Decode transcript bytes to UTF-8, detecting the charset when the input is
/// not already valid UTF-8. Undecodable characters are dropped.
/// ref. https://github.com/thuleqaid/rust-chardet
pub fn encode_to_utf8_raw(input: &[u8]) -> Result<String> {
    // valid utf-8 needs no detection (chardet misreads short ascii-ish text)
    if let Ok(s) = std::str::from_utf8(input) {
        return Ok(s.to_string());
    }
    // result.0 Encode, result.1 Confidence, result.2 Language
    let result = chardet::detect(input);
    tracing::debug!(
        "detected transcript encoding {} (confidence {:.2})",
        result.0,
        result.1
    );

    let coder = encoding_from_whatwg_label(chardet::charset2encoding(&result.0));
    if let Some(c) = coder {
        c.decode(input, DecoderTrap::Ignore)
            .map_err(|e| anyhow!("Error:{:?}", e))
    } else {
        Err(anyhow!("cannot find character encodings: {:?}", &result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        let text = "Moderator: ¿Qué opinas? 価格は高い。";
        assert_eq!(encode_to_utf8_raw(text.as_bytes()).unwrap(), text);
    }
}
