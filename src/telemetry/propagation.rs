// SPDX-License-Identifier: MIT
//! W3C trace-context propagation over HTTP headers.
//!
//! The composite propagator carries `traceparent`/`tracestate` only; baggage is
//! not propagated. [`install`] registers it globally; [`extract`] and
//! [`inject_current`] use the global propagator on inbound and outbound headers.
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::{global, Context};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// The propagator used for every HTTP boundary of this service.
pub fn propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![Box::new(TraceContextPropagator::new())])
}

/// Install [`propagator`] as the global text-map propagator.
pub fn install() {
    global::set_text_map_propagator(propagator());
}

/// Read-only view of inbound headers.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Writable view of outbound headers.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

/// Remote parent context carried by `headers`, if any.
pub fn extract(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Write the current span's context into `headers`.
pub fn inject_current(headers: &mut HeaderMap) {
    let cx = tracing::Span::current().context();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&cx, &mut HeaderInjector(headers));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };

    const TRACEPARENT: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    #[test]
    fn injects_traceparent_for_remote_context() {
        let span_context = SpanContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let cx = Context::new().with_remote_span_context(span_context);

        let mut headers = HeaderMap::new();
        propagator().inject_context(&cx, &mut HeaderInjector(&mut headers));

        assert_eq!(headers.get("traceparent").unwrap(), TRACEPARENT);
        assert!(headers.get("baggage").is_none());
    }

    #[test]
    fn extracts_remote_parent() {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static(TRACEPARENT));

        let cx = propagator().extract(&HeaderExtractor(&headers));
        let span = cx.span();
        let span_context = span.span_context();

        assert!(span_context.is_remote());
        assert_eq!(
            span_context.trace_id().to_string(),
            "0af7651916cd43dd8448eb211c80319c"
        );
        assert_eq!(span_context.span_id().to_string(), "b7ad6b7169203331");
    }

    #[test]
    fn missing_header_yields_invalid_context() {
        let headers = HeaderMap::new();
        let cx = propagator().extract(&HeaderExtractor(&headers));
        assert!(!cx.span().span_context().is_valid());
    }

    #[test]
    fn injector_skips_invalid_values() {
        let mut headers = HeaderMap::new();
        HeaderInjector(&mut headers).set("traceparent", "bad\nvalue".to_string());
        assert!(headers.is_empty());
    }
}
