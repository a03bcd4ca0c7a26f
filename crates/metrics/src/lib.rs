use anyhow::Result;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::info;

#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    runs: IntCounterVec,
    messages_sent: IntCounter,
    working_id: IntGauge,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let runs = IntCounterVec::new(
            Opts::new("h2h_runs_total", "Notifier invocations by outcome"),
            &["outcome"],
        )?;
        let messages_sent =
            IntCounter::new("h2h_messages_sent_total", "Chat messages delivered")?;
        let working_id = IntGauge::new("h2h_working_id", "Gameweek currently tracked")?;
        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(messages_sent.clone()))?;
        registry.register(Box::new(working_id.clone()))?;
        Ok(Self {
            registry,
            runs,
            messages_sent,
            working_id,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// `outcome` is a short label such as `results`, `maintenance` or `failed`.
    pub fn record_run(&self, outcome: &str, messages_sent: usize) {
        self.runs.with_label_values(&[outcome]).inc();
        self.messages_sent.inc_by(messages_sent as u64);
    }

    pub fn set_working_id(&self, id: u32) {
        self.working_id.set(i64::from(id));
    }

    pub fn render(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let make_svc = make_service_fn(move |_| {
            let metrics = self.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, hyper::Error>(metrics.respond()) }
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }

    fn respond(&self) -> Response<Body> {
        let mut response = match self.render() {
            Ok(buffer) => Response::new(Body::from(buffer)),
            Err(err) => {
                tracing::warn!(error = ?err, "failed to encode metrics");
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return response;
            }
        };
        if let Ok(value) = TextEncoder::new().format_type().parse::<hyper::header::HeaderValue>() {
            response
                .headers_mut()
                .insert(hyper::header::CONTENT_TYPE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_run_counters_and_gauge() {
        let metrics = MetricsHandle::new().expect("metrics");
        metrics.record_run("results", 5);
        metrics.record_run("idle", 0);
        metrics.set_working_id(12);

        let text = String::from_utf8(metrics.render().expect("render")).expect("utf8");
        assert!(text.contains("h2h_runs_total{outcome=\"results\"} 1"));
        assert!(text.contains("h2h_messages_sent_total 5"));
        assert!(text.contains("h2h_working_id 12"));
    }
}
