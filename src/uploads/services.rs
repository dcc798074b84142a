use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::state::AppState;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

pub fn profile_key(user_id: Uuid, ext: &str) -> String {
    format!("profiles/{}/{}.{}", user_id, Uuid::new_v4(), ext)
}

/// Store a profile image and return its public URL.
pub async fn store_profile_image(
    st: &AppState,
    user_id: Uuid,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(content_type)
        .with_context(|| format!("unsupported content type {}", content_type))?;
    let key = profile_key(user_id, ext);
    st.storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(st.storage.public_url(&key))
}
