use crate::config::{BakeConfigOverrides, ShBackendKind};
use crate::direction::{CubeFace, RowOrigin};
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Arguments of the `sh_bake` tool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BakeArgs {
    /// Face images in cube-face order (+x, -x, +y, -y, +z, -z).
    pub faces: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    backend: Option<ShBackendKind>,
    workers: Option<usize>,
    row_origin: Option<RowOrigin>,
}

impl BakeArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = BakeArgs::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Use --face <path> for each cube face.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "face" => {
                    if parsed.faces.len() == CubeFace::ALL.len() {
                        bail!("At most {} --face arguments are accepted.", CubeFace::ALL.len());
                    }
                    parsed.faces.push(PathBuf::from(value));
                }
                "config" => parsed.config = Some(PathBuf::from(value)),
                "output" => parsed.output = Some(PathBuf::from(value)),
                "backend" => {
                    parsed.backend = Some(
                        ShBackendKind::parse(&value)
                            .ok_or_else(|| anyhow!("Invalid backend '{value}'. Use cpu or gpu."))?,
                    );
                }
                "workers" => {
                    let workers =
                        value.parse::<usize>().with_context(|| format!("Invalid worker count '{value}'"))?;
                    if workers == 0 {
                        bail!("--workers must be at least 1");
                    }
                    parsed.workers = Some(workers);
                }
                "row-origin" => {
                    parsed.row_origin = Some(RowOrigin::parse(&value).ok_or_else(|| {
                        anyhow!("Invalid row origin '{value}'. Use top_left or bottom_left.")
                    })?);
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --face, --config, --output, --backend, --workers, --row-origin."
                ),
            }
        }
        if parsed.faces.is_empty() {
            bail!("At least one --face <path> is required.");
        }
        Ok(parsed)
    }

    /// Cube faces paired with the image paths given for them.
    pub fn face_paths(&self) -> impl Iterator<Item = (CubeFace, &PathBuf)> {
        CubeFace::ALL.into_iter().zip(self.faces.iter())
    }

    pub fn config_overrides(&self) -> BakeConfigOverrides {
        BakeConfigOverrides { backend: self.backend, worker_threads: self.workers, row_origin: self.row_origin }
    }
}
