//! Feature-gated tracing facade.
//!
//! With the `tracing` feature (default) the macros below are the `tracing`
//! crate's. Without it they expand to nothing, so instrumented code in the
//! matcher, machine and prover costs nothing in stripped builds.

#[cfg(feature = "tracing")]
pub use tracing::{debug, debug_span, info, info_span, trace, warn};

#[cfg(not(feature = "tracing"))]
mod noop {
    pub struct Span;

    impl Span {
        pub fn none() -> Self {
            Span
        }

        pub fn entered(self) -> SpanGuard {
            SpanGuard
        }
    }

    pub struct SpanGuard;

    #[macro_export]
    macro_rules! trace {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! debug {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! info {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! warn {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! debug_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    #[macro_export]
    macro_rules! info_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    pub use crate::{debug, debug_span, info, info_span, trace, warn};
}

#[cfg(not(feature = "tracing"))]
pub use noop::*;

/// Install a stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
#[cfg(feature = "tracing")]
pub fn init_subscriber() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(false),
        )
        .with(filter)
        .try_init()
        .ok();
}

#[cfg(not(feature = "tracing"))]
pub fn init_subscriber() {}

/// Write folded stacks of every span to `path` for flamegraph rendering.
///
/// Keep the returned guard alive until the run being profiled is over.
#[cfg(feature = "tracing")]
pub fn init_flamegraph(path: &str) -> std::io::Result<impl Drop> {
    use tracing_flame::FlameLayer;
    use tracing_subscriber::{prelude::*, registry::Registry};

    let (flame_layer, guard) = FlameLayer::with_file(path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Registry::default().with(flame_layer).try_init().ok();
    Ok(guard)
}

#[cfg(not(feature = "tracing"))]
pub fn init_flamegraph(_path: &str) -> std::io::Result<impl Drop> {
    struct NoFlame;
    impl Drop for NoFlame {
        fn drop(&mut self) {}
    }
    Ok(NoFlame)
}
