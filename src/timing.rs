//! Tracing setup and span timing.
//!
//! [`DispatchBuilder`] is used to construct a stack of tracing `Layer`s. At the
//! top is an [`EnvFilter`] layer that filters events using the `RUST_LOG`
//! environment variable. For example, `RUST_LOG="exprfold::opt=trace" cargo
//! test` prints every rewrite rule that fires.
//!
//! A logging layer writes to standard error, or to the test writer in tests.
//!
//! Finally, the [`TimingLayer`] can be enabled in the [`DispatchBuilder`]. It
//! measures active times of spans (e.g. the `optimize` span of each
//! optimizer run) and accumulates them by span name. Measurements can be
//! retrieved via [`TimingLayer::read_active()`].
//!
//! [`EnvFilter`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Once,
    },
    time::{Duration, Instant},
};

use clap::Args;
use dashmap::DashMap;
use tracing::{info, span, Dispatch, Subscriber};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
    EnvFilter,
};

static INIT: Once = Once::new();

/// Install the dispatcher built by `builder` as the global default. Only the
/// first call has an effect.
pub fn init_tracing(builder: DispatchBuilder) {
    INIT.call_once(|| {
        // another subscriber may have been installed by the host already
        let _ = tracing::dispatcher::set_global_default(builder.finish());
    });
}

#[derive(Debug, Default, Clone, Args)]
#[command(next_help_heading = "Debug Options")]
pub struct DebugOptions {
    /// Emit tracing events as json instead of (ANSI) text.
    #[arg(long)]
    pub json: bool,

    /// Accumulate the time spent in tracing spans. The spans need to be
    /// enabled for this to work.
    #[arg(long)]
    pub timing: bool,
}

impl DebugOptions {
    /// Install the global tracing dispatcher configured by these options.
    pub fn init_tracing(&self) {
        init_tracing(
            DispatchBuilder::default()
                .json(self.json)
                .timing(self.timing),
        );
    }
}

/// Log the accumulated span times, longest first.
pub fn print_timings() {
    let Some(totals) = TimingLayer::read_active() else {
        return;
    };
    let mut totals: Vec<_> = totals.into_iter().collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, duration) in totals {
        info!(span = name, ?duration, "time spent");
    }
}

/// A builder for the stack of layers that process tracing events and spans.
#[derive(Default)]
pub struct DispatchBuilder {
    timing: bool,
    json: bool,
}

impl DispatchBuilder {
    /// Enable or disable the [`TimingLayer`].
    pub fn timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    /// Enable or disable json output.
    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn finish(self) -> Dispatch {
        // Layer stacks are statically typed, so every combination of options
        // gets its own arm.
        macro_rules! logging_layer {
            () => {{
                let layer;
                cfg_if::cfg_if! {
                    if #[cfg(test)] {
                        layer = tracing_subscriber::fmt::layer().with_test_writer();
                    } else {
                        layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
                    }
                }
                cfg_if::cfg_if! {
                    if #[cfg(feature = "log-print-timeless")] {
                        layer.without_time()
                    } else {
                        layer
                    }
                }
            }};
        }

        let registry = tracing_subscriber::registry();
        match (self.timing, self.json) {
            (true, true) => Dispatch::new(EnvFilter::from_default_env().with_subscriber(
                logging_layer!()
                    .json()
                    .with_subscriber(TimingLayer::default().with_subscriber(registry)),
            )),
            (true, false) => Dispatch::new(EnvFilter::from_default_env().with_subscriber(
                logging_layer!().with_subscriber(TimingLayer::default().with_subscriber(registry)),
            )),
            (false, true) => Dispatch::new(
                EnvFilter::from_default_env()
                    .with_subscriber(logging_layer!().json().with_subscriber(registry)),
            ),
            (false, false) => Dispatch::new(
                EnvFilter::from_default_env().with_subscriber(logging_layer!().with_subscriber(registry)),
            ),
        }
    }
}

/// A tracing `Layer` that accumulates the time spent inside spans, by span
/// name.
#[derive(Default)]
pub struct TimingLayer {
    entered: DashMap<span::Id, (Duration, Option<Instant>)>,
    totals: DashMap<&'static str, AtomicU64>,
}

impl TimingLayer {
    /// Total time per span name, if the default dispatcher has a
    /// [`TimingLayer`].
    pub fn read_active() -> Option<HashMap<&'static str, Duration>> {
        tracing::dispatcher::get_default(|dispatch: &Dispatch| {
            let layer: &TimingLayer = dispatch.downcast_ref()?;
            Some(layer.totals())
        })
    }

    pub fn totals(&self) -> HashMap<&'static str, Duration> {
        self.totals
            .iter()
            .map(|entry| {
                let nanos = entry.value().load(Ordering::Relaxed);
                (*entry.key(), Duration::from_nanos(nanos))
            })
            .collect()
    }
}

impl<S> Layer<S> for TimingLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_enter(&self, id: &span::Id, _ctx: Context<'_, S>) {
        let mut entry = self
            .entered
            .entry(id.clone())
            .or_insert((Duration::ZERO, None));
        entry.1 = Some(Instant::now());
    }

    fn on_exit(&self, id: &span::Id, _ctx: Context<'_, S>) {
        if let Some(mut entry) = self.entered.get_mut(id) {
            if let Some(start) = entry.1.take() {
                entry.0 += start.elapsed();
            }
        }
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        let Some((_, (elapsed, _))) = self.entered.remove(&id) else {
            return;
        };
        let Some(metadata) = ctx.metadata(&id) else {
            return;
        };
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.totals
            .entry(metadata.name())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(nanos, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use tracing_subscriber::layer::SubscriberExt;

    use super::{DebugOptions, TimingLayer};

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        debug: DebugOptions,
    }

    #[test]
    fn debug_options_parse() {
        let cli = Cli::parse_from(["exprfold", "--timing"]);
        assert!(cli.debug.timing);
        assert!(!cli.debug.json);
    }

    #[test]
    fn spans_are_timed_by_name() {
        let subscriber = tracing_subscriber::registry().with(TimingLayer::default());
        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..3 {
                let span = tracing::info_span!("work");
                let _entered = span.enter();
            }
            let totals = TimingLayer::read_active().expect("timing layer is installed");
            assert!(totals.contains_key("work"));
        });
    }
}
