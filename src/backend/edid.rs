//! EDID Identity Decoding
//!
//! Pulls the vendor, product and serial strings out of a base EDID block.
//! Only the identity fields are decoded; timings come from the backend.

/// Identity strings of a display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdidIdentity {
    /// Three-letter PNP manufacturer id
    pub vendor: Option<String>,
    /// Monitor name descriptor
    pub product: Option<String>,
    /// Serial string descriptor, or the numeric serial when absent
    pub serial: Option<String>,
}

const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
const BASE_BLOCK_LEN: usize = 128;
const DESCRIPTOR_START: usize = 54;
const DESCRIPTOR_LEN: usize = 18;
const DESCRIPTOR_COUNT: usize = 4;

const TAG_SERIAL: u8 = 0xFF;
const TAG_PRODUCT: u8 = 0xFC;

/// Decode the identity fields of an EDID blob
///
/// Returns `None` for blobs shorter than one base block or with a bad
/// header.
pub fn parse(edid: &[u8]) -> Option<EdidIdentity> {
    if edid.len() < BASE_BLOCK_LEN || edid[..8] != EDID_HEADER {
        return None;
    }

    let mut identity = EdidIdentity {
        vendor: pnp_id(edid[8], edid[9]),
        ..EdidIdentity::default()
    };

    for n in 0..DESCRIPTOR_COUNT {
        let start = DESCRIPTOR_START + n * DESCRIPTOR_LEN;
        let block = &edid[start..start + DESCRIPTOR_LEN];

        // Pixel clock of zero marks a display descriptor
        if block[0] != 0 || block[1] != 0 {
            continue;
        }

        let text = descriptor_text(&block[5..]);
        if text.is_empty() {
            continue;
        }

        match block[3] {
            TAG_PRODUCT => identity.product = Some(text),
            TAG_SERIAL => identity.serial = Some(text),
            _ => {}
        }
    }

    if identity.serial.is_none() {
        let numeric = u32::from_le_bytes([edid[12], edid[13], edid[14], edid[15]]);
        if numeric != 0 {
            identity.serial = Some(numeric.to_string());
        }
    }

    Some(identity)
}

fn pnp_id(hi: u8, lo: u8) -> Option<String> {
    let packed = u16::from_be_bytes([hi, lo]);
    let letters = [
        ((packed >> 10) & 0x1F) as u8,
        ((packed >> 5) & 0x1F) as u8,
        (packed & 0x1F) as u8,
    ];

    if letters.iter().any(|&l| l == 0 || l > 26) {
        return None;
    }

    Some(letters.iter().map(|&l| (b'A' + l - 1) as char).collect())
}

fn descriptor_text(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|&b| b == 0x0A || b == 0x00)
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(tag: u8, text: &str) -> [u8; DESCRIPTOR_LEN] {
        let mut block = [0u8; DESCRIPTOR_LEN];
        block[3] = tag;
        let mut payload = [b' '; 13];
        payload[..text.len()].copy_from_slice(text.as_bytes());
        if text.len() < 13 {
            payload[text.len()] = 0x0A;
        }
        block[5..].copy_from_slice(&payload);
        block
    }

    fn sample_edid() -> Vec<u8> {
        let mut edid = vec![0u8; BASE_BLOCK_LEN];
        edid[..8].copy_from_slice(&EDID_HEADER);
        // "DEL" = 00100 00101 01100
        edid[8] = 0x10;
        edid[9] = 0xAC;
        // Detailed timing in slot 0: nonzero pixel clock
        edid[54] = 0x01;
        edid[55] = 0x1D;
        let name = descriptor(TAG_PRODUCT, "DELL U2720Q");
        edid[72..90].copy_from_slice(&name);
        let serial = descriptor(TAG_SERIAL, "ABC123");
        edid[90..108].copy_from_slice(&serial);
        edid
    }

    #[test]
    fn test_parse_identity() {
        let identity = parse(&sample_edid()).unwrap();
        assert_eq!(identity.vendor.as_deref(), Some("DEL"));
        assert_eq!(identity.product.as_deref(), Some("DELL U2720Q"));
        assert_eq!(identity.serial.as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_numeric_serial_fallback() {
        let mut edid = sample_edid();
        edid[90..108].fill(0);
        edid[90] = 0x01;
        edid[12..16].copy_from_slice(&4242u32.to_le_bytes());
        let identity = parse(&edid).unwrap();
        assert_eq!(identity.serial.as_deref(), Some("4242"));
    }

    #[test]
    fn test_rejects_short_or_headerless() {
        assert!(parse(&[0u8; 64]).is_none());
        assert!(parse(&[0u8; 128]).is_none());
    }

    #[test]
    fn test_invalid_pnp_letters() {
        assert_eq!(pnp_id(0, 0), None);
        assert_eq!(pnp_id(0x10, 0xAC).as_deref(), Some("DEL"));
    }
}
