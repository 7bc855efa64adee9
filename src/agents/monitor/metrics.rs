use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

/// Prometheus collector for the dispatch engine
pub struct DispatchMetrics {
    registry: Registry,

    // Decision metrics
    pub selections_total: CounterVec,
    pub selection_duration: Histogram,
    pub termination_decisions_total: CounterVec,
    pub decision_duration: Histogram,

    // Agent metrics
    pub responses_total: CounterVec,
    pub response_duration: HistogramVec,
    pub tool_calls_total: CounterVec,

    // Loop metrics
    pub loop_stops_total: CounterVec,
    pub sessions_active: Gauge,
}

impl DispatchMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let selections_total = CounterVec::new(
            Opts::new("dispatch_selections_total", "Agent selections by agent and outcome"),
            &["agent", "outcome"],
        )?;
        registry.register(Box::new(selections_total.clone()))?;

        let selection_duration = Histogram::with_opts(HistogramOpts::new(
            "dispatch_selection_duration_seconds",
            "Time spent choosing the next agent",
        ))?;
        registry.register(Box::new(selection_duration.clone()))?;

        let termination_decisions_total = CounterVec::new(
            Opts::new("dispatch_termination_decisions_total", "Termination checks by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(termination_decisions_total.clone()))?;

        let decision_duration = Histogram::with_opts(HistogramOpts::new(
            "dispatch_termination_duration_seconds",
            "Time spent on termination checks",
        ))?;
        registry.register(Box::new(decision_duration.clone()))?;

        let responses_total = CounterVec::new(
            Opts::new("dispatch_responses_total", "Agent responses by agent"),
            &["agent"],
        )?;
        registry.register(Box::new(responses_total.clone()))?;

        let response_duration = HistogramVec::new(
            HistogramOpts::new("dispatch_response_duration_seconds", "Agent execution duration"),
            &["agent"],
        )?;
        registry.register(Box::new(response_duration.clone()))?;

        let tool_calls_total = CounterVec::new(
            Opts::new("dispatch_tool_calls_total", "Tool calls by tool and status"),
            &["tool", "status"],
        )?;
        registry.register(Box::new(tool_calls_total.clone()))?;

        let loop_stops_total = CounterVec::new(
            Opts::new("dispatch_loop_stops_total", "Orchestration loop exits by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(loop_stops_total.clone()))?;

        let sessions_active = Gauge::new(
            "dispatch_sessions_active",
            "Number of sessions currently being orchestrated",
        )?;
        registry.register(Box::new(sessions_active.clone()))?;

        Ok(Self {
            registry,
            selections_total,
            selection_duration,
            termination_decisions_total,
            decision_duration,
            responses_total,
            response_duration,
            tool_calls_total,
            loop_stops_total,
            sessions_active,
        })
    }

    /// Render the text exposition format
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_encoding() {
        let metrics = DispatchMetrics::new().unwrap();
        metrics.selections_total.with_label_values(&["Sales", "ai"]).inc();
        metrics.loop_stops_total.with_label_values(&["iteration_ceiling"]).inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("dispatch_selections_total{agent=\"Sales\",outcome=\"ai\"} 1"));
        assert!(text.contains("dispatch_loop_stops_total"));
    }

    #[test]
    fn test_collectors_are_independent() {
        let a = DispatchMetrics::new().unwrap();
        let b = DispatchMetrics::new().unwrap();
        a.responses_total.with_label_values(&["Sales"]).inc();
        assert!(!b.encode().unwrap().contains("Sales"));
    }
}
