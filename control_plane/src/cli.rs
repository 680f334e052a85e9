use crate::controllers::fullhybrid::converter::ServiceConverterKind;
use clap::Parser;
use getset::{CopyGetters, Getters};
use ko_core::instrumentation::LogFormat;

#[derive(Debug, Parser, Getters, CopyGetters)]
#[command(about = "Translates Gateway API objects into Konnect entities", long_about = None)]
pub struct Cli {
    /// Restricts every watch to one namespace; all namespaces when unset.
    #[getset(get = "pub")]
    #[arg(env = "WATCH_NAMESPACE", long = "watch-namespace")]
    watch_namespace: Option<String>,

    #[getset(get_copy = "pub")]
    #[arg(default_value = "plain", env = "LOG_FORMAT", long = "log-format")]
    log_format: LogFormat,

    #[getset(get_copy = "pub")]
    #[arg(default_value = "8081", env = "HEALTH_PORT", long = "health-port")]
    health_port: u16,

    #[getset(get_copy = "pub")]
    #[arg(default_value = "service", env = "SERVICE_CONVERTER", long = "service-converter")]
    service_converter: ServiceConverterKind,
}
