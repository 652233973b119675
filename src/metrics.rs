use std::time::Instant;

use actix_web::{error, get, web, HttpResponse};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub handler: String,
}

#[derive(Clone, Debug)]
pub struct Metrics {
    request_duration: Family<RequestLabels, Histogram>,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let gateway_registry = registry.sub_registry_with_prefix("gateway");

        // 100us up to ~3.3s
        let request_duration = Family::<RequestLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.0001, 2.0, 16))
        });
        gateway_registry.register(
            "request_duration_seconds",
            "Request handling duration in seconds",
            request_duration.clone(),
        );

        Self { request_duration }
    }

    /// Records the elapsed time for `handler` when the returned guard drops.
    pub fn start_timer(&self, handler: &str) -> RequestTimer {
        let histogram = self
            .request_duration
            .get_or_create(&RequestLabels {
                handler: handler.to_string(),
            })
            .clone();

        RequestTimer {
            histogram,
            start: Instant::now(),
        }
    }
}

pub struct RequestTimer {
    histogram: Histogram,
    start: Instant,
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

#[get("/metrics")]
pub async fn serve_metrics(registry: web::Data<Registry>) -> actix_web::Result<HttpResponse> {
    let mut buffer = String::new();
    encode(&mut buffer, &registry)
        .map_err(|_| error::ErrorInternalServerError("could not encode metrics"))?;

    Ok(HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(buffer))
}
