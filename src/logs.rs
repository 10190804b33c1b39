use std::fs;
use std::path::Path;

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    {ContentLimit, FileRotate},
};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use crate::errors::{Error, Result};

/// Initializes crate logging into a rolling file under
/// `<cache_dir>/logs/`. Call at most once per process.
pub fn init(cache_dir: &str) -> Result<()> {
    let dir = Path::new(cache_dir).join("logs/");
    fs::create_dir_all(&dir)?;
    let log = FileRotate::new(
        dir.join("main.log"),
        AppendTimestamp::default(FileLimit::MaxFiles(3)),
        ContentLimit::Lines(1000),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    WriteLogger::init(LevelFilter::Info, config, log).map_err(|e| Error::Logging(e.to_string()))?;
    Ok(())
}
