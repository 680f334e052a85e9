use std::sync::Once;
use strum::{Display, EnumString, IntoStaticStr};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

pub fn init_instrumentation(format: LogFormat) {
    INIT.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true);

        let result = match format {
            LogFormat::Plain => tracing::subscriber::set_global_default(builder.finish()),
            LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        };

        #[allow(clippy::expect_used)]
        // Logging is set up once at startup; failing to install it should stop the process
        result.expect("Failed to set tracing subscriber");
    });
}
