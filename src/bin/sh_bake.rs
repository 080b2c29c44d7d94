use anyhow::{Context, Result};
use irradiance_sh::cli::BakeArgs;
use irradiance_sh::config::BakeConfig;
use irradiance_sh::direction::CubeFace;
use irradiance_sh::probe::ShProbeBaker;
use irradiance_sh::sh::ShCoefficients;
use irradiance_sh::texture::FaceTexture;
use serde::Serialize;
use std::fs;

#[derive(Debug, Serialize)]
struct BakeReport {
    backend: &'static str,
    row_origin: &'static str,
    faces: Vec<&'static str>,
    coefficients: ShCoefficients,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = match BakeArgs::parse_from_env() {
        Ok(args) => args,
        Err(err) => {
            log::error!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(args) {
        log::error!("Bake failed: {err:?}");
        std::process::exit(1);
    }
}

fn run(args: BakeArgs) -> Result<()> {
    let mut config = match args.config.as_ref() {
        Some(path) => BakeConfig::load_or_default(path),
        None => BakeConfig::default(),
    };
    let overrides = args.config_overrides();
    if !overrides.is_empty() {
        log::info!("[cli] overriding config fields: {}", overrides.applied_fields().join(", "));
        config.apply_overrides(&overrides);
    }

    let faces: Vec<(CubeFace, FaceTexture)> = args
        .face_paths()
        .map(|(face, path)| {
            FaceTexture::load(path)
                .with_context(|| format!("loading face {} from '{}'", face.label(), path.display()))
                .map(|texture| (face, texture))
        })
        .collect::<Result<_>>()?;

    let mut baker = ShProbeBaker::from_config(&config)?;
    let coefficients = baker.bake_cube(&faces)?;
    let report = BakeReport {
        backend: baker.backend_label(),
        row_origin: config.row_origin.label(),
        faces: faces.iter().map(|(face, _)| face.label()).collect(),
        coefficients,
    };
    let json = serde_json::to_string_pretty(&report)?;
    match args.output.as_ref() {
        Some(path) => {
            fs::write(path, format!("{json}\n"))
                .with_context(|| format!("writing coefficients to '{}'", path.display()))?;
            log::info!("[sh] wrote coefficients to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
