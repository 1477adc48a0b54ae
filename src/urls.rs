//! Public asset URL shapes.
//!
//! | asset          | path                 |
//! |----------------|----------------------|
//! | original       | `/img/{id}/`         |
//! | thumbnail      | `/img/thumb/{id}/`   |
//! | expiring link  | `/img/temp/{id}/`    |
//!
//! Identifiers in these paths must be version-4 UUIDs in hyphenated form.

use uuid::{Uuid, Variant};

pub fn original_url(image_id: Uuid) -> String {
    format!("/img/{}/", image_id)
}

pub fn thumbnail_url(thumbnail_id: Uuid) -> String {
    format!("/img/thumb/{}/", thumbnail_id)
}

pub fn expiring_url(link_id: Uuid) -> String {
    format!("/img/temp/{}/", link_id)
}

/// Parse an asset identifier from a URL segment.
///
/// Accepts only hyphenated `xxxxxxxx-xxxx-4xxx-[89ab]xxx-xxxxxxxxxxxx`;
/// anything else (other versions, simple or braced forms) yields `None`.
pub fn parse_asset_id(segment: &str) -> Option<Uuid> {
    if segment.len() != 36 {
        return None;
    }
    let id = Uuid::try_parse(segment).ok()?;
    if id.get_version_num() != 4 || id.get_variant() != Variant::RFC4122 {
        return None;
    }
    Some(id)
}

/// Prefix a path with the scheme and host it was requested through.
pub fn absolute(scheme: &str, host: &str, path: &str) -> String {
    format!("{}://{}{}", scheme, host, path)
}
