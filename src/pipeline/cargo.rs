//! `CARGO_HOME` stage
//!
//! Pass-through layer: nothing is installed here directly. The installer run
//! by the `rustup` stage writes `cargo`, `rustup` and the toolchain proxies
//! into this directory as a side effect.

use super::{StageContext, StageReport};
use crate::error::RustupLayersResult;
use crate::layer::env::PATH_DELIMITER;
use crate::layer::{BuildEnvironment, Fingerprint, Layer, LayerAction, LayerContributor, LayerTypes};
use async_trait::async_trait;
use serde::Serialize;

pub const LAYER_NAME: &str = "cargo";

#[derive(Debug, Serialize)]
struct Inputs {
    layer: &'static str,
}

struct Passthrough;

#[async_trait]
impl LayerAction for Passthrough {
    async fn rebuild(&self, _layer: &mut Layer) -> RustupLayersResult<()> {
        Ok(())
    }
}

/// Contribute the layer and export `CARGO_HOME`
pub async fn contribute(
    context: &StageContext<'_>,
    env: &mut BuildEnvironment,
) -> RustupLayersResult<StageReport> {
    let mut layer = Layer::new(context.layers_dir, LAYER_NAME);
    let cargo_home = layer.path.display().to_string();
    let bin = layer.path.join("bin").display().to_string();
    layer.env.set_override("CARGO_HOME", &cargo_home);
    layer.env.prepend("PATH", &bin, PATH_DELIMITER);

    let contributor = LayerContributor::new(
        Fingerprint::of(&Inputs { layer: LAYER_NAME })?,
        LayerTypes::BUILD_CACHE,
    );
    let status = contributor.contribute(&mut layer, &Passthrough).await?;
    env.apply(&layer.env);

    StageReport::collect(&layer, status).await
}
