//! JSON Reconstruction Demo - Detections File to Lead/Follow Skeletons
//! ===================================================================
//!
//! Reads an observation document and a pinhole camera file, runs the full
//! pipeline and writes `lead.json` / `follow.json` into the output directory.
//!
//! Camera file layout:
//! ```json
//! [{ "id": 0, "centre": [5.0, 2.0, 0.0], "target": [0.0, 1.0, 0.0], "focal": 800.0 }]
//! ```
//!
//! Run:
//! ```bash
//! cargo run --example reconstruct_json -- observations.json cameras.json out/ [config.toml]
//! ```

use duetpose_core::{Reconstruction, ReconstructionConfig, ReconstructionContext, Role};
use duetpose_env::{CameraId, EnvError, JsonStore, RayProjector, RayRecord};
use nalgebra::Vector3;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pinhole camera looking from `centre` towards `target`, pixel y up.
#[derive(Debug, Deserialize)]
struct PinholeCamera {
    id: CameraId,
    centre: Vector3<f64>,
    target: Vector3<f64>,
    focal: f64,
}

struct PinholeRig {
    cameras: BTreeMap<CameraId, PinholeCamera>,
}

impl RayProjector for PinholeRig {
    fn pixel_ray(&self, camera: CameraId, pixel: [f64; 2]) -> Result<RayRecord, EnvError> {
        let cam = self
            .cameras
            .get(&camera)
            .ok_or(EnvError::UnknownCamera(camera))?;
        let forward = (cam.target - cam.centre).normalize();
        let right = forward.cross(&Vector3::y()).normalize();
        let up = right.cross(&forward);
        let direction = forward + right * (pixel[0] / cam.focal) + up * (pixel[1] / cam.focal);
        Ok(RayRecord::new(cam.centre.into(), direction.into()))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("usage: reconstruct_json <observations.json> <cameras.json> <out_dir> [config.toml]");
        std::process::exit(2);
    }

    let config = match args.get(3) {
        Some(path) => ReconstructionConfig::load(path)?,
        None => ReconstructionConfig::default(),
    };

    let cameras: Vec<PinholeCamera> = serde_json::from_str(&fs::read_to_string(&args[1])?)?;
    let rig = PinholeRig {
        cameras: cameras.into_iter().map(|c| (c.id, c)).collect(),
    };

    let mut store = JsonStore::open(&args[0], &args[2])?;
    let ctx = ReconstructionContext::from_source(&store);
    let pipeline = Reconstruction::new(config)?;
    let output = pipeline.run(&ctx, &store, &rig)?;

    for role in Role::TRACKED {
        if let Some(subject) = output.subject(role) {
            info!(%role, valid = subject.valid_count(), total = subject.poses.len(), "Reconstructed");
        }
    }

    output.export(&mut store)?;
    info!(out = %args[2], "Wrote skeleton sequences");
    Ok(())
}
