use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// Set `CONFGRAPH_QUIET=1` to suppress spinners and informational logging
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("CONFGRAPH_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}
