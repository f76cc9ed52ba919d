use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};
use log::LevelFilter;

/// `RUST_LOG` is honoured unless `debug` forces debug output.
pub fn init_logger(debug: bool) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            Local::now().format("%Y-%m-%dT%H:%M:%S"),
            record.level(),
            record.args()
        )
    });
    if debug {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}
