use criterion::{criterion_group, criterion_main};

mod network {
    pub mod application {
        pub mod mqtt {
            pub mod client;
        }
    }
}

criterion_group!(
    benches,
    network::application::mqtt::client::bench_publish,
    network::application::mqtt::client::bench_receive,
    network::application::mqtt::client::bench_publish_qos1_round_trip
);
criterion_main!(benches);
