use rocket::serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// npm publish document (PUT /{package})
#[derive(Deserialize, Debug, Clone)]
pub struct NpmPublishRequest {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, Value>,
    #[serde(rename = "_attachments", default)]
    pub attachments: BTreeMap<String, NpmAttachment>,
    #[serde(default)]
    pub readme: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NpmAttachment {
    #[serde(default)]
    pub content_type: Option<String>,
    /// Base64 encoded tarball.
    pub data: String,
    #[serde(default)]
    pub length: Option<u64>,
}

#[derive(Serialize, Debug, Clone)]
pub struct NpmPublishResponse {
    pub ok: bool,
    pub id: String,
    pub rev: String,
    pub success: bool,
}
