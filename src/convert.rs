//! Record decoding.  Every function here is total: absent or oddly shaped
//! attributes fall back to defaults instead of failing.

use crate::store::{AttrValue, Record};
use crate::{BotProperties, ClientInfo, StoredSecret};

pub const DEFAULT_COLOR: &str = "#ac08d5";
pub const DEFAULT_ACCENT_COLOR: &str = "#ffffff";
pub const DEFAULT_NAME: &str = "Customer Assist";

fn string_attr<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record
        .get(name)
        .and_then(AttrValue::as_str)
        .filter(|s| !s.is_empty())
}

fn string_or(record: &Record, name: &str, default: &str) -> String {
    string_attr(record, name).unwrap_or(default).to_string()
}

/// Decode a bot-properties item.  `company_name` is left empty; it is never
/// read from this record.
pub fn to_bot_properties(record: &Record) -> BotProperties {
    BotProperties {
        color: string_or(record, "color", DEFAULT_COLOR),
        accent_color: string_or(record, "accentColor", DEFAULT_ACCENT_COLOR),
        name: string_or(record, "name", DEFAULT_NAME),
        description: string_or(record, "description", ""),
        launcher_icon_path: string_or(record, "launcherIcon", ""),
        agent_image_path: string_or(record, "agentImage", ""),
        agent_avatar_path: string_or(record, "agentAvatar", ""),
        company_name: String::new(),
    }
}

pub fn to_client_info(record: &Record) -> ClientInfo {
    ClientInfo {
        company_name: string_or(record, "companyname", ""),
    }
}

/// Decode one secrets item.  `apikey` is stored list-wrapped; its first
/// element is the key.
pub fn decode_secret(record: &Record) -> StoredSecret {
    StoredSecret {
        client_id: string_or(record, "clientid", ""),
        api_key: record
            .get("apikey")
            .and_then(AttrValue::first_str)
            .map(str::to_string),
    }
}

/// The secret consulted for validation: the first item of the query result.
pub fn to_client_secret(records: &[Record]) -> Option<StoredSecret> {
    records.first().map(decode_secret)
}
