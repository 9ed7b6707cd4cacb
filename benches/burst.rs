use std::net::SocketAddr;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use slirc_wire::Line;
use slircd_link::store::User;
use slircd_link::{Config, MemoryStore, NetClock, SyncManager};

const NOW: i64 = 1_700_000_000;

fn manager(users: usize, channels: usize) -> SyncManager<MemoryStore> {
    let config = Config::parse(
        r#"
        [server]
        name = "hub.bench"
        description = "Benchmark hub"

        [[link]]
        name = "leaf.bench"
        hostname = "192.0.2.50"
        port = 7000
        send_password = "pw"
        recv_password = "pw"
        "#,
    )
    .unwrap();
    let mut sm = SyncManager::new(config, MemoryStore::new("hub.bench"), NetClock::frozen(NOW));
    for i in 0..users {
        sm.local_connect(User {
            nick: format!("user{i}"),
            ident: format!("ident{i}"),
            host: format!("host{i}.example.org"),
            dhost: format!("cloak{i}.example.org"),
            ip: "203.0.113.9".into(),
            gecos: "Benchmark user".into(),
            age: NOW - 100,
            signon: NOW - 100,
            idle_since: NOW,
            server: String::new(),
            modes: Default::default(),
            oper_type: None,
            away: None,
            metadata: Default::default(),
        });
    }
    for i in 0..users {
        let chan = format!("#chan{}", i % channels);
        sm.local_join(&format!("user{i}"), &chan);
    }
    sm.take_actions();
    sm
}

/// Accept a peer and run it through to our burst.
fn link_and_burst(mut sm: SyncManager<MemoryStore>) -> usize {
    let addr: SocketAddr = "192.0.2.50:40000".parse().unwrap();
    let conn = sm.accept(addr).unwrap();
    sm.handle_line(conn, "SERVER leaf.bench pw 0 :Leaf");
    sm.handle_line(conn, &format!(":leaf.bench BURST {NOW}"));
    sm.take_actions().len()
}

fn burst_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst");
    for (users, channels) in [(100, 10), (1_000, 100), (10_000, 500)] {
        group.throughput(Throughput::Elements(users as u64));
        group.bench_function(format!("{users}_users_{channels}_channels"), |b| {
            b.iter_batched(
                || manager(users, channels),
                link_and_burst,
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    let raw = ":hub.bench NICK 1699999900 user1 host1.example.org cloak1.example.org ident1 +iw 203.0.113.9 :Benchmark user";
    group.throughput(Throughput::Bytes(raw.len() as u64));
    group.bench_function("parse_nick_intro", |b| b.iter(|| Line::parse(raw).unwrap()));
    group.finish();
}

criterion_group!(benches, burst_benchmark, parse_benchmark);
criterion_main!(benches);
