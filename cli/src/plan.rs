//! Loading build plans from TOML files

use std::path::Path;

use anyhow::Context;
use dib_models::{BuildPlan, Operation};
use validator::Validate;

/// Read and validate the build plan at `path`. Relative host paths in the plan are
/// resolved against the plan's directory.
pub fn load_plan(path: &Path) -> anyhow::Result<BuildPlan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read build plan {}", path.display()))?;
    let mut plan: BuildPlan = toml::from_str(&text)
        .with_context(|| format!("Failed to parse build plan {}", path.display()))?;
    plan.validate()
        .with_context(|| format!("Invalid build plan {}", path.display()))?;

    let base_dir = path.parent().unwrap_or(Path::new(""));
    resolve_paths(&mut plan, base_dir);
    Ok(plan)
}

fn resolve_paths(plan: &mut BuildPlan, base_dir: &Path) {
    for binding in &mut plan.volumes {
        // Bare names are named volumes
        let host = Path::new(&binding.host_path);
        let is_path = binding.host_path.starts_with('.') || binding.host_path.contains('/');
        if host.is_relative() && is_path {
            binding.host_path = base_dir.join(host).to_string_lossy().into_owned();
        }
    }
    for step in &mut plan.steps {
        if let Operation::Copy { src, .. } = step {
            if src.is_relative() {
                *src = base_dir.join(&*src);
            }
        }
    }
}
