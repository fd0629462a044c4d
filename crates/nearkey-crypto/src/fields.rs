//! Protocol field constants and fixed-layout encoders.
//!
//! Every field in the unidentifiable advertisement is a length-and-type
//! structure: the high nibble of the first byte carries the payload length,
//! the low nibble the protocol-assigned field type. The scanner's parser
//! depends on these exact values.

/// Flags byte leading the account key filter advertisement payload.
pub const ADV_FLAGS: u8 = 0x00;

/// Field type nibble for the account key filter.
pub const FILTER_FIELD_TYPE: u8 = 0x0;

/// Salt field descriptor byte, written directly after the filter bits.
pub const SALT_FIELD_DESCRIPTOR: u8 = 0x01;

/// Field type nibble for the connection status block.
pub const CONNECTION_STATUS_FIELD_TYPE: u8 = 0x5;

/// Field type nibble for random resolvable data.
pub const RRD_FIELD_TYPE: u8 = 0x6;

/// Payload length of the connection status block (state, custom, bitmap).
pub const CONNECTION_STATUS_PAYLOAD_LEN: u8 = 3;

/// Total length of the encoded connection status block.
pub const CONNECTION_STATUS_LEN: usize = 4;

/// Tag written over the in-use key's first byte when its device is
/// connected and holds the active audio stream.
pub const TAG_IN_USE_ACTIVE: u8 = 0x06;

/// Tag written over the in-use key's first byte when its device is merely
/// the most recently used handset.
pub const TAG_MOST_RECENTLY_USED: u8 = 0x05;

/// HKDF info label for deriving the per-advertisement RRD key.
pub const RRD_KEY_INFO: &[u8] = b"SASS-RRD-KEY";

/// Encode the 4-byte connection status block.
///
/// Layout: `[(3 << 4) | 0x5, state, custom, bitmap]`. This is the plaintext
/// that the RRD pipeline encrypts; it is never advertised in the clear.
pub fn encode_connection_status(state: u8, custom: u8, bitmap: u8) -> [u8; CONNECTION_STATUS_LEN] {
    [
        (CONNECTION_STATUS_PAYLOAD_LEN << 4) | CONNECTION_STATUS_FIELD_TYPE,
        state,
        custom,
        bitmap,
    ]
}

/// Frame an RRD ciphertext into its advertised form.
///
/// Prepends `(ciphertext_len << 4) | 0x6`. The ciphertext length equals the
/// connection status block length by construction, so the descriptor is
/// `0x46` in practice.
pub fn frame_rrd(ciphertext: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(1 + ciphertext.len());
    framed.push(((ciphertext.len() as u8) << 4) | RRD_FIELD_TYPE);
    framed.extend_from_slice(ciphertext);
    framed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_status_descriptor_is_0x35() {
        let blob = encode_connection_status(0xE1, 0x42, 0x03);
        assert_eq!(blob, [0x35, 0xE1, 0x42, 0x03]);
    }

    #[test]
    fn rrd_frame_descriptor_encodes_length_and_type() {
        let framed = frame_rrd(&[0x6E, 0xBC, 0xCB, 0x21]);
        assert_eq!(framed, vec![0x46, 0x6E, 0xBC, 0xCB, 0x21]);
    }

    #[test]
    fn rrd_frame_of_empty_ciphertext() {
        assert_eq!(frame_rrd(&[]), vec![0x06]);
    }
}
