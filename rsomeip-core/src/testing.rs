#![cfg(test)]

/// Creates a new Ipv4 socket address.
///
/// - `ipv4!([127, 0, 0, 1], 12345)` creates the address `127.0.0.1:12345`.
/// - `ipv4!([127, 0, 0, 1])` creates the address `127.0.0.1:0`, which lets the OS pick a port.
macro_rules! ipv4 {
    ([$($addr:tt),*], $port:tt) => {
        ::std::net::SocketAddr::new(
            ::std::net::IpAddr::V4(::std::net::Ipv4Addr::new($($addr),*)),
            $port,
        )
    };
    ([$($addr:tt),*]) => {
        crate::testing::ipv4!([$($addr),*], 0)
    };
}
pub(crate) use ipv4;

/// Installs a `tracing` subscriber writing to the test output.
///
/// The filter is read from `RUST_LOG` and defaults to `debug`.
pub fn configure_tracing() {
    use std::sync::OnceLock;
    static TRACING: OnceLock<()> = OnceLock::new();
    TRACING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::DEBUG.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .try_init();
    });
}
