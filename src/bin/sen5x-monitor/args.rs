use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about = "Averages SEN5x measurements in batches and logs or publishes them")]
pub struct Args {
    #[arg(long, env = "SEN5X_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// CSV of recorded samples served in place of a physical device.
    #[arg(long, env = "SEN5X_SAMPLES")]
    pub samples: PathBuf,

    /// Product name the replayed device reports; selects which channels are supported.
    #[arg(long, env = "SEN5X_PRODUCT_NAME", default_value = "SEN55")]
    pub product_name: String,

    /// Data log file; overrides `data_logging.file_name`.
    pub data_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_data_file_is_optional() {
        let args = Args::try_parse_from(["sen5x-monitor", "--samples", "s.csv"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert_eq!(args.product_name, "SEN55");
        assert_eq!(args.data_file, None);

        let args =
            Args::try_parse_from(["sen5x-monitor", "--samples", "s.csv", "kitchen"]).unwrap();
        assert_eq!(args.data_file.as_deref(), Some("kitchen"));
    }
}
