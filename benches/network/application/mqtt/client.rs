use criterion::{BatchSize, Criterion, Throughput};
use libmqtt::network::application::mqtt::{Client, Clock, Connect, IoStatus, Publish, QoS};
use libmqtt::network::error::Error;
use libmqtt::network::{Close, Connection, Read, Write};
use std::hint::black_box;
use std::time::Duration;

const BATCH: usize = 50;

/// In-memory socket: reads drain `inbound`, writes are dropped.
#[derive(Default)]
struct Memory {
    inbound: Vec<u8>,
    cursor: usize,
}

impl Read for Memory {
    type Error = Error;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let left = &self.inbound[self.cursor..];
        if left.is_empty() {
            return Err(Error::WouldBlock);
        }
        let n = buf.len().min(left.len());
        buf[..n].copy_from_slice(&left[..n]);
        self.cursor += n;
        Ok(n)
    }
}

impl Write for Memory {
    type Error = Error;
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(black_box(buf).len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for Memory {
    type Error = Error;
    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for Memory {}

struct Stopped;

impl Clock for Stopped {
    fn now(&self) -> Duration {
        Duration::ZERO
    }
}

type BenchClient = Client<'static, Memory, Stopped, (), 64>;

fn setup_client() -> BenchClient {
    let memory = Memory {
        inbound: b"\x20\x02\x00\x00".to_vec(),
        ..Default::default()
    };
    let mut client = Client::new(memory, Stopped, ());
    client
        .connect(Connect {
            client_id: "libmqtt-bench".into(),
            keep_alive: 60,
            clean_session: true,
            ..Default::default()
        })
        .expect("Failed to queue connect");
    assert_eq!(client.process_output(), IoStatus::BlockData);
    assert_eq!(client.process_input(), IoStatus::BlockConn);
    client
}

fn feed(client: &mut BenchClient, bytes: Vec<u8>) {
    let memory = client.connection_mut();
    memory.inbound = bytes;
    memory.cursor = 0;
}

pub fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");
    let payload = b"hello world from bench";
    group.throughput(Throughput::Bytes((payload.len() * BATCH) as u64));
    group.bench_function("publish_qos0", |b| {
        b.iter_batched_ref(
            setup_client,
            |client| {
                for _ in 0..BATCH {
                    client
                        .publish(Publish::new("libmqtt/bench-topic", payload, QoS::AtMostOnce))
                        .expect("Failed to publish");
                    black_box(client.process_output());
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

pub fn bench_receive(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive");
    let mut packet = b"\x30\x19\x00\x0dlibmqtt/bench".to_vec();
    packet.extend_from_slice(&[0x5a; 10]);
    let stream = packet.repeat(BATCH);
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("receive_qos0", |b| {
        b.iter_batched_ref(
            || {
                let mut client = setup_client();
                feed(&mut client, stream.clone());
                client
            },
            |client| assert_eq!(client.process_input(), IoStatus::BlockConn),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

pub fn bench_publish_qos1_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_qos1_round_trip");
    let payload = b"hello world from bench qos1";
    group.throughput(Throughput::Bytes((payload.len() * BATCH) as u64));
    group.bench_function("publish_qos1_round_trip", |b| {
        b.iter_batched_ref(
            setup_client,
            |client| {
                let mut acks = Vec::with_capacity(4 * BATCH);
                for _ in 0..BATCH {
                    let id = client
                        .publish(Publish::new("libmqtt/bench-topic", payload, QoS::AtLeastOnce))
                        .expect("Failed to publish");
                    acks.extend_from_slice(&[0x40, 0x02]);
                    acks.extend_from_slice(&id.to_be_bytes());
                }
                assert_eq!(client.process_output(), IoStatus::BlockData);
                feed(client, acks);
                assert_eq!(client.process_input(), IoStatus::BlockConn);
                assert_eq!(client.pending_requests(), 0);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}
