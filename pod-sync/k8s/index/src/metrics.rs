use crate::SharedIndex;
use ahash::AHashMap as HashMap;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Debug)]
struct Instrumented(SharedIndex);

pub fn register(reg: &mut Registry, index: SharedIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let this = self.0.read();

        let mut by_ns = HashMap::<&str, u32>::new();
        for pod in this.state().iter() {
            *by_ns.entry(pod.reference.namespace.as_str()).or_default() += 1;
        }

        let mut pods_encoder = encoder.encode_descriptor(
            "cluster_state_size",
            "The number of pods in the synchronized cluster state",
            None,
            MetricType::Gauge,
        )?;
        for (ns, count) in by_ns {
            let labels = [("namespace", ns)];
            let pods = ConstGauge::new(count);
            let pods_encoder = pods_encoder.encode_family(&labels)?;
            pods.encode(pods_encoder)?;
        }

        let conduits_encoder = encoder.encode_descriptor(
            "conduit_pairs_open",
            "The number of open conduit pairs",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(this.conduits().len() as u32).encode(conduits_encoder)?;

        Ok(())
    }
}
