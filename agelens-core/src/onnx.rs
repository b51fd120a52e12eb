//! Shared ONNX graph loading for the face and attribute models.

use std::{fmt::Write, path::Path};

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TypedFact, TypedOp,
};

pub(crate) type RunnableModel =
    SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Load `path` as an optimized plan, falling back to a decluttered graph
/// when the optimizer rejects it.
pub(crate) fn load_runnable(path: &Path, name: &str) -> Result<RunnableModel> {
    anyhow::ensure!(path.exists(), "{name} model not found: {}", path.display());

    match build(path, name, true) {
        Ok(plan) => {
            debug!("{name} model {} optimized", path.display());
            Ok(plan)
        }
        Err(opt_err) => {
            let mut causes = String::new();
            for cause in opt_err.chain() {
                let _ = writeln!(&mut causes, "  - {cause}");
            }
            warn!(
                "{name} model {} failed optimized load; using decluttered graph.\n{}",
                path.display(),
                causes.trim_end()
            );
            build(path, name, false).with_context(|| {
                format!("decluttered {name} graph also failed after optimize error: {opt_err}")
            })
        }
    }
}

fn build(path: &Path, name: &str, optimized: bool) -> Result<RunnableModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;

    let typed = if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow!("unable to optimize {name} graph: {e}"))?
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow!("unable to type-check {name} graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow!("unable to declutter {name} graph: {e}"))?
    };
    typed
        .into_runnable()
        .map_err(|e| anyhow!("unable to make {name} graph runnable: {e}"))
}
