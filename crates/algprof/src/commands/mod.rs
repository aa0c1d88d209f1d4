pub mod check;
pub mod simulate;

use crate::error::{Error, Result};
use algprof_trace::Task;
use std::path::Path;

/// Load a task description, naming the task after the file stem unless a
/// name is given
pub(crate) fn load_task(path: &Path, name: Option<&str>) -> Result<Task> {
    if !path.exists() {
        return Err(Error::TaskNotFound(path.display().to_string()));
    }
    let name = match name {
        Some(name) => name.to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "task".to_string()),
    };
    Ok(Task::from_file(name, path)?)
}
