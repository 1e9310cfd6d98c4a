use provenant_config::{find_root, initialize_root};
use provenant_core::{Error, Result};

pub fn execute() -> Result<()> {
    let current = std::env::current_dir()
        .map_err(|e| Error::file_system(".", "read current directory", e))?;

    if let Some(project_dir) = find_root(&current) {
        if project_dir != current {
            tracing::warn!(
                project = %project_dir.display(),
                "already inside a provenant project, creating a nested one"
            );
        }
    }

    let root = initialize_root(&current)?;
    println!("{}", root.display());
    Ok(())
}
