use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_placed_total: IntCounter,
    pub shop_orders_active: IntGauge,
    pub shop_order_transitions_total: IntCounterVec,
    pub courier_location_samples_total: IntCounterVec,
    pub checkout_latency_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_placed_total =
            IntCounter::new("orders_placed_total", "Total orders created at checkout")
                .expect("valid orders_placed_total metric");

        let shop_orders_active = IntGauge::new(
            "shop_orders_active",
            "Shop orders not yet delivered or cancelled",
        )
        .expect("valid shop_orders_active metric");

        let shop_order_transitions_total = IntCounterVec::new(
            Opts::new(
                "shop_order_transitions_total",
                "Shop order transitions by transition and outcome",
            ),
            &["transition", "outcome"],
        )
        .expect("valid shop_order_transitions_total metric");

        let courier_location_samples_total = IntCounterVec::new(
            Opts::new(
                "courier_location_samples_total",
                "Courier location samples by outcome",
            ),
            &["outcome"],
        )
        .expect("valid courier_location_samples_total metric");

        let checkout_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "checkout_latency_seconds",
            "Latency of order placement in seconds",
        ))
        .expect("valid checkout_latency_seconds metric");

        registry
            .register(Box::new(orders_placed_total.clone()))
            .expect("register orders_placed_total");
        registry
            .register(Box::new(shop_orders_active.clone()))
            .expect("register shop_orders_active");
        registry
            .register(Box::new(shop_order_transitions_total.clone()))
            .expect("register shop_order_transitions_total");
        registry
            .register(Box::new(courier_location_samples_total.clone()))
            .expect("register courier_location_samples_total");
        registry
            .register(Box::new(checkout_latency_seconds.clone()))
            .expect("register checkout_latency_seconds");

        Self {
            registry,
            orders_placed_total,
            shop_orders_active,
            shop_order_transitions_total,
            courier_location_samples_total,
            checkout_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
