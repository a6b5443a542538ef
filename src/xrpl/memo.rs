//! Bridge memo carried by inbound XRPL payments
//!
//! The memo data is the hex encoding of a UTF-8 JSON document:
//! `{"type":"oraibridge-xrpl-v1","orai_recipient":"<address>","memo":"<text>"}`.

use serde::{Deserialize, Serialize};

/// Type tag identifying bridge memos
pub const BRIDGE_MEMO_TYPE: &str = "oraibridge-xrpl-v1";

/// XRPL memo as found in a transaction's `Memos` array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    #[serde(rename = "MemoData", default)]
    pub memo_data: String,
    #[serde(rename = "MemoType", default, skip_serializing_if = "Option::is_none")]
    pub memo_type: Option<String>,
    #[serde(rename = "MemoFormat", default, skip_serializing_if = "Option::is_none")]
    pub memo_format: Option<String>,
}

/// Element of the `Memos` array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoWrapper {
    #[serde(rename = "Memo")]
    pub memo: Memo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMemo {
    #[serde(rename = "type")]
    pub memo_type: String,
    pub orai_recipient: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memo: String,
}

/// Build the memo a user attaches to a payment towards the bridge
pub fn encode_bridge_memo(orai_recipient: &str, memo: &str) -> MemoWrapper {
    let bridge_memo = BridgeMemo {
        memo_type: BRIDGE_MEMO_TYPE.to_string(),
        orai_recipient: orai_recipient.to_string(),
        memo: memo.to_string(),
    };
    // serializing a struct of strings cannot fail
    let json = serde_json::to_vec(&bridge_memo).unwrap_or_default();

    MemoWrapper {
        memo: Memo {
            memo_data: hex::encode(json),
            ..Memo::default()
        },
    }
}

/// Find the bridge memo among a transaction's memos.
///
/// Memos with empty or undecodable data are skipped. The first decodable
/// memo decides: a foreign type tag or an empty recipient yields `None`.
pub fn decode_bridge_memo(memos: &[MemoWrapper]) -> Option<BridgeMemo> {
    for wrapper in memos {
        let data = &wrapper.memo.memo_data;
        if data.is_empty() {
            continue;
        }

        let Ok(bytes) = hex::decode(data) else {
            continue;
        };
        let Ok(bridge_memo) = serde_json::from_slice::<BridgeMemo>(&bytes) else {
            continue;
        };

        if bridge_memo.memo_type != BRIDGE_MEMO_TYPE || bridge_memo.orai_recipient.is_empty() {
            return None;
        }
        return Some(bridge_memo);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT: &str = "orai1fs25usz65tsryf0f8d5cpfmqgr0xwup4kjqpa0";
    const VALID_MEMO_DATA: &str = "7b2274797065223a226f7261696272696467652d7872706c2d7631222c226f7261695f726563697069656e74223a226f726169316673323575737a3635747372796630663864356370666d7167723078777570346b6a71706130227d";
    const WRONG_TYPE_MEMO_DATA: &str = "7b2274797065223a226f7261696272696467652d7872706c222c226f7261695f726563697069656e74223a226f726169316d79636d6879726d64366475737034303872746a677a6c6b3737333876687467717968787874227d";

    fn memo(data: &str) -> MemoWrapper {
        MemoWrapper {
            memo: Memo {
                memo_data: data.to_string(),
                ..Memo::default()
            },
        }
    }

    fn recipient(memos: &[MemoWrapper]) -> Option<String> {
        decode_bridge_memo(memos).map(|memo| memo.orai_recipient)
    }

    #[test]
    fn test_decode_empty_and_malformed() {
        assert_eq!(recipient(&[]), None);
        assert_eq!(recipient(&[memo("")]), None);
        assert_eq!(recipient(&[memo("7b122")]), None);
    }

    #[test]
    fn test_decode_wrong_type() {
        assert_eq!(recipient(&[memo(WRONG_TYPE_MEMO_DATA)]), None);
        // the first decodable memo decides
        assert_eq!(
            recipient(&[memo(WRONG_TYPE_MEMO_DATA), memo(VALID_MEMO_DATA)]),
            None
        );
    }

    #[test]
    fn test_decode_valid() {
        assert_eq!(recipient(&[memo(VALID_MEMO_DATA)]).as_deref(), Some(RECIPIENT));
        assert_eq!(
            recipient(&[memo(""), memo("zz"), memo(VALID_MEMO_DATA)]).as_deref(),
            Some(RECIPIENT)
        );
    }

    #[test]
    fn test_encode_matches_wire_format() {
        assert_eq!(encode_bridge_memo(RECIPIENT, "").memo.memo_data, VALID_MEMO_DATA);
    }

    #[test]
    fn test_roundtrip_with_memo_text() {
        let wrapper = encode_bridge_memo(RECIPIENT, "invoice 42");
        let decoded = decode_bridge_memo(&[wrapper]).unwrap();
        assert_eq!(decoded.orai_recipient, RECIPIENT);
        assert_eq!(decoded.memo, "invoice 42");
    }

    #[test]
    fn test_memo_json_shape() {
        let json = r#"[{"Memo":{"MemoData":"ABCD","MemoType":"74657874"}}]"#;
        let memos: Vec<MemoWrapper> = serde_json::from_str(json).unwrap();
        assert_eq!(memos[0].memo.memo_data, "ABCD");
        assert_eq!(memos[0].memo.memo_type.as_deref(), Some("74657874"));
    }
}
