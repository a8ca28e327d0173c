//! Editor remote-attach identifiers for running containers.

use space_dock_common::APP_DIR;

const ATTACHED_CONTAINER: &str = "attached-container+";
const URI_PREFIX: &str = "vscode://vscode-remote/";
const FOLDER_URI_PREFIX: &str = "vscode-remote://";

/// URI that opens an editor window attached to the container.
pub fn connection_uri(short_id: &str) -> String {
    format!(
        "{URI_PREFIX}{ATTACHED_CONTAINER}{}{APP_DIR}",
        hex::encode(short_id)
    )
}

/// Same target in the form accepted by `code --folder-uri`.
pub fn folder_uri(short_id: &str) -> String {
    format!(
        "{FOLDER_URI_PREFIX}{ATTACHED_CONTAINER}{}{APP_DIR}",
        hex::encode(short_id)
    )
}

/// Recovers the container short id from either URI form.
pub fn decode_connection_uri(uri: &str) -> Option<String> {
    let (_, rest) = uri.split_once(ATTACHED_CONTAINER)?;
    let encoded = rest.strip_suffix(APP_DIR)?;
    let bytes = hex::decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}
