use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` 優先，未設定時使用預設 directives
fn env_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// CLI 日誌寫到 stderr，stdout 只留給 `create` 的 JSON 結果
pub fn init_cli_logger(verbose: bool) {
    let directives = if verbose {
        "psl_stitch=debug,info"
    } else {
        "psl_stitch=info,warn"
    };

    tracing_subscriber::registry()
        .with(env_filter(directives))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false)
                .compact(),
        )
        .init();
}

pub fn init_server_logger(verbose: bool, json: bool) {
    let directives = if verbose {
        "psl_stitch=debug,tower_http=debug,info"
    } else {
        "psl_stitch=info,tower_http=info"
    };
    let registry = tracing_subscriber::registry().with(env_filter(directives));

    if json {
        // 部署環境使用 JSON 格式，方便集中收集
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_falls_back_to_defaults() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let rendered = env_filter("psl_stitch=debug,info").to_string();
        assert!(rendered.contains("psl_stitch=debug"));
        assert!(rendered.contains("info"));
    }
}
