// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Log module provides log setup, reference
//! https://docs.rs/log4rs

#[cfg(feature = "log4rs")]
use log::LevelFilter;

#[cfg(feature = "log4rs")]
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

/// init logs system
#[cfg(feature = "log4rs")]
pub fn init_log(level: LevelFilter, file_path: &str) {
    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l} {t} {m}{n}\n",
        )))
        .build(file_path)
        .unwrap();
    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(level)))
                .build("logfile", Box::new(logfile)),
        )
        .build(Root::builder().appender("logfile").build(level))
        .unwrap();
    let _handle = log4rs::init_config(config).unwrap();
}
