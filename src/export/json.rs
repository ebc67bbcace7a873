use super::{ExportError, SessionSnapshot};
use std::io::Write;
use std::path::Path;

/// Export a session snapshot to JSON format
pub fn export_snapshot<P: AsRef<Path>>(snapshot: &SessionSnapshot, output_path: P) -> Result<(), ExportError> {
    export_json(snapshot, output_path)
}

/// Read a session snapshot previously written with [`export_snapshot`]
pub fn import_snapshot<P: AsRef<Path>>(input_path: P) -> Result<SessionSnapshot, ExportError> {
    let content = std::fs::read_to_string(input_path)?;
    serde_json::from_str(&content).map_err(|e| ExportError::SerializationError(e.to_string()))
}

/// Export any serializable data structure to JSON
pub fn export_json<T, P>(data: &T, output_path: P) -> Result<(), ExportError>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let json_data = serde_json::to_string_pretty(data)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    let mut file = std::fs::File::create(output_path)?;
    file.write_all(json_data.as_bytes())?;

    Ok(())
}
