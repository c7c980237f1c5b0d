use std::path::PathBuf;

use clap::Args;

use pipeline::Configuration;

use super::error::DatacatError;

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Файл с данными (CSV, JSON, NDJSON, Parquet). Перекрывает [source].path
    pub path: Option<PathBuf>,

    /// Выдать не более N записей
    #[arg(short = 'n', long = "limit")]
    pub limit: Option<usize>,

    /// Путь к datacat.toml
    #[arg(long, default_value = "datacat.toml", env = "DATACAT_CONFIG")]
    pub config: PathBuf,

    /// Логировать pacing и доставку каждой записи на уровне info
    #[arg(long)]
    pub debug: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: datacat.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub config: Configuration,
    /// Путь к данным из CLI (если задан).
    pub path: Option<PathBuf>,
}

impl Effective {
    pub fn new(args: &RunArgs) -> Result<Self, DatacatError> {
        let mut config = Configuration::load(&args.config)?;

        if let Some(path) = &args.path {
            if !path.exists() {
                return Err(DatacatError::Config(format!("data path not found: {}", path.display())));
            }
        } else if config.source.as_ref().and_then(|s| s.path()).is_none() {
            return Err(DatacatError::Config(
                "no data path: pass one as an argument or set [source].path".into(),
            ));
        }

        if args.limit.is_some() {
            config.limit = args.limit;
        }
        config.debug |= args.debug;

        Ok(Self { config, path: args.path.clone() })
    }
}
