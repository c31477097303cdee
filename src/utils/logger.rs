use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Фильтр по умолчанию, если RUST_LOG не задан
const DEFAULT_FILTER: &str = "warn,phrase_practice=info";

/// Initializes `env_logger` for the library and its binary.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger() {
    init_logger_with(DEFAULT_FILTER);
}

/// Same as [`init_logger`] with a different fallback filter, e.g. for `--verbose`.
pub fn init_logger_with(default_filter: &str) {
    // Установка базового фильтра и переопределение через переменные окружения
    let env = Env::default().filter_or("RUST_LOG", default_filter);

    let mut builder = Builder::from_env(env);

    // Явно подавляем логи от шумных зависимостей
    builder
        .filter_module("symphonia", LevelFilter::Warn)
        .filter_module("symphonia_core", LevelFilter::Warn)
        .filter_module("symphonia_bundle_mp3", LevelFilter::Warn)
        .filter_module("mio", LevelFilter::Error)
        .filter_module("tokio_util", LevelFilter::Error)
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("hyper_util", LevelFilter::Error)
        .filter_module("reqwest", LevelFilter::Warn)
        // Переходы сессий пишутся на уровне debug
        .filter_module("phrase_practice::practice::scheduler", LevelFilter::Info)
        // Форматирование логов
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logger();
        init_logger_with("debug");
        log::info!("logger ready");
    }
}
