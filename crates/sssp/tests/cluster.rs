//! Multi-host runs over the in-process transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bsp_graph::prelude::*;
use bsp_net::{LocalCluster, Transport};
use bsp_sssp::sync::{self, GhostSync};
use bsp_sssp::{BackendKind, ComputeBackend, Dist, RunStats, SsspConfig, INF};

struct HostRun {
    stats: RunStats,
    graph: Arc<PGraph>,
    backend: Arc<dyn ComputeBackend>,
}

impl HostRun {
    fn owned(&self) -> HashMap<Gid, Dist> {
        self.graph
            .owned_nodes()
            .map(|node| (self.graph.l2g(node), self.backend.node_value(node)))
            .collect()
    }

    fn value_of(&self, gid: Gid) -> Dist {
        self.backend.node_value(self.graph.g2l(gid).unwrap())
    }
}

fn run_cluster(shards: Vec<Shard>, config: SsspConfig) -> Vec<HostRun> {
    let endpoints = LocalCluster::new(shards.len() as u32);
    let mut runs = Vec::new();

    thread::scope(|scope| {
        let mut handles = Vec::new();
        for (shard, net) in shards.into_iter().zip(endpoints) {
            handles.push(scope.spawn(move || {
                let graph = Arc::new(PGraph::from_shard(shard).unwrap());
                let backend = BackendKind::Cpu.create(Arc::clone(&graph)).unwrap();
                let stats = bsp_sssp::run(
                    Arc::clone(&graph),
                    Arc::clone(&backend),
                    Arc::new(net),
                    config,
                )
                .unwrap();
                HostRun {
                    stats,
                    graph,
                    backend,
                }
            }));
        }
        for handle in handles {
            runs.push(handle.join().unwrap());
        }
    });

    runs
}

/// After the final exchange every ghost copy equals the owner's value.
fn assert_replicas_consistent(runs: &[HostRun]) {
    for run in runs {
        for node in run.graph.ghost_nodes() {
            let gid = run.graph.l2g(node);
            let owner = run.graph.host_of(gid).unwrap() as usize;
            assert_eq!(
                run.backend.node_value(node),
                runs[owner].value_of(gid),
                "replica of {gid} diverges from its owner"
            );
        }
    }
}

#[test]
fn bridge_graph_converges_across_two_hosts() {
    // Host 0 owns {0, 1} with 0 -> 1 (5) and the boundary edge 1 -> 2 (2),
    // host 1 owns {2, 3} with 2 -> 3 (1).
    let shards = vec![
        Shard {
            num_hosts: 2,
            id: 0,
            part_offsets: vec![0, 2, 4],
            edges: vec![(0, 1, 5), (1, 2, 2)],
        },
        Shard {
            num_hosts: 2,
            id: 1,
            part_offsets: vec![0, 2, 4],
            edges: vec![(2, 3, 1)],
        },
    ];

    let runs = run_cluster(shards, SsspConfig::new(0, 10));

    assert_eq!(runs[0].owned(), HashMap::from([(0, 0), (1, 5)]));
    assert_eq!(runs[1].owned(), HashMap::from([(2, 7), (3, 8)]));
    assert!(runs[0].stats.converged);
    assert_eq!(runs[0].stats.rounds, runs[1].stats.rounds);
    // Distances settle in round 2; round 3 detects the fixed point.
    assert_eq!(runs[0].stats.rounds, 4);

    assert_replicas_consistent(&runs);
}

#[test]
fn concurrent_pushes_into_a_replicated_vertex_take_the_minimum() {
    // Hosts 0 and 1 both push into vertex 4, owned by host 2, in the same
    // rounds; the owner must end up with the minimum candidate.
    let part_offsets = vec![0, 2, 4, 5];
    let shards = vec![
        Shard {
            num_hosts: 3,
            id: 0,
            part_offsets: part_offsets.clone(),
            edges: vec![(0, 1, 1), (0, 2, 1), (1, 4, 10)],
        },
        Shard {
            num_hosts: 3,
            id: 1,
            part_offsets: part_offsets.clone(),
            edges: vec![(2, 3, 1), (3, 4, 5)],
        },
        Shard {
            num_hosts: 3,
            id: 2,
            part_offsets,
            edges: vec![],
        },
    ];

    let runs = run_cluster(shards, SsspConfig::new(0, 10));

    assert_eq!(runs[0].owned(), HashMap::from([(0, 0), (1, 1)]));
    assert_eq!(runs[1].owned(), HashMap::from([(2, 1), (3, 2)]));
    // min(1 + 10, 2 + 5) through the two boundary edges.
    assert_eq!(runs[2].owned(), HashMap::from([(4, 7)]));

    assert_replicas_consistent(&runs);
}

#[test]
fn disconnected_partition_keeps_the_sentinel() {
    // Host 1's component is unreachable from the source.
    let shards = vec![
        Shard {
            num_hosts: 2,
            id: 0,
            part_offsets: vec![0, 2, 4],
            edges: vec![(0, 1, 3)],
        },
        Shard {
            num_hosts: 2,
            id: 1,
            part_offsets: vec![0, 2, 4],
            edges: vec![(2, 3, 1)],
        },
    ];

    let runs = run_cluster(shards, SsspConfig::new(0, 6));

    assert_eq!(runs[0].owned(), HashMap::from([(0, 0), (1, 3)]));
    assert_eq!(runs[1].owned(), HashMap::from([(2, INF), (3, INF)]));
    assert!(runs[0].stats.converged);
}

#[test]
fn round_zero_exchange_seeds_source_replicas() {
    // Host 1 holds a ghost copy of the source. The copy starts at the
    // sentinel and must be corrected by the exchange that precedes the
    // first compute.
    let shards = [
        Shard {
            num_hosts: 2,
            id: 0,
            part_offsets: vec![0, 1, 2],
            edges: vec![],
        },
        Shard {
            num_hosts: 2,
            id: 1,
            part_offsets: vec![0, 1, 2],
            edges: vec![(1, 0, 1)],
        },
    ];

    let endpoints = LocalCluster::new(2);
    thread::scope(|scope| {
        for (shard, net) in shards.into_iter().zip(endpoints) {
            scope.spawn(move || {
                let host = net.host_id();
                let graph = Arc::new(PGraph::from_shard(shard).unwrap());
                let backend = BackendKind::Cpu.create(Arc::clone(&graph)).unwrap();
                let sync = GhostSync::new(Arc::clone(&graph), Arc::clone(&backend));
                GhostSync::register(&sync, &net);

                backend.init();
                if host == 0 {
                    backend.set_node_value(0, 0);
                }
                net.barrier().unwrap();

                sync.bootstrap(&net).unwrap();
                net.barrier().unwrap();
                sync.check_fatal().unwrap();

                sync.send_ghost_cells(&net).unwrap();
                net.barrier().unwrap();
                sync.check_fatal().unwrap();

                // Before any relaxation ran, the exchange alone has seeded
                // the replica of the source.
                if host == 1 {
                    let ghost = graph.g2l(0).unwrap();
                    assert_eq!(backend.node_value(ghost), 0);
                }
            });
        }
    });
}

#[test]
fn forged_replica_count_is_fatal_after_the_bootstrap_barrier() {
    let shards = [
        Shard {
            num_hosts: 2,
            id: 0,
            part_offsets: vec![0, 1, 2],
            edges: vec![],
        },
        Shard {
            num_hosts: 2,
            id: 1,
            part_offsets: vec![0, 1, 2],
            edges: vec![],
        },
    ];

    let endpoints = LocalCluster::new(2);
    thread::scope(|scope| {
        for (shard, net) in shards.into_iter().zip(endpoints) {
            scope.spawn(move || {
                let host = net.host_id();
                let graph = Arc::new(PGraph::from_shard(shard).unwrap());
                let backend = BackendKind::Cpu.create(Arc::clone(&graph)).unwrap();
                let sync = GhostSync::new(Arc::clone(&graph), Arc::clone(&backend));
                GhostSync::register(&sync, &net);

                sync.bootstrap(&net).unwrap();
                if host == 1 {
                    // Announce replicas that were never requested.
                    let forged = bincode::serialize(&7_u64).unwrap();
                    net.send(0, sync::REPLICA_COUNT, forged).unwrap();
                }
                net.barrier().unwrap();

                let fatal = sync.check_fatal();
                if host == 0 {
                    assert!(matches!(
                        fatal,
                        Err(bsp_sssp::Error::BootstrapInconsistency {
                            host: 1,
                            expected: 7,
                            actual: 0,
                        })
                    ));
                } else {
                    assert!(fatal.is_ok());
                }
            });
        }
    });
}

#[test]
fn stale_graph_handles_are_fatal() {
    let shards = [
        Shard {
            num_hosts: 2,
            id: 0,
            part_offsets: vec![0, 1, 2],
            edges: vec![],
        },
        Shard {
            num_hosts: 2,
            id: 1,
            part_offsets: vec![0, 1, 2],
            edges: vec![],
        },
    ];

    let endpoints = LocalCluster::new(2);
    thread::scope(|scope| {
        for (shard, net) in shards.into_iter().zip(endpoints) {
            scope.spawn(move || {
                let host = net.host_id();
                let graph = Arc::new(PGraph::from_shard(shard).unwrap());
                let backend = BackendKind::Cpu.create(Arc::clone(&graph)).unwrap();
                let sync = GhostSync::new(Arc::clone(&graph), Arc::clone(&backend));
                GhostSync::register(&sync, &net);

                if host == 1 {
                    // A node update with a token the receiver never issued.
                    let forged = bincode::serialize(&(u64::MAX, 0_u32, 0_i32)).unwrap();
                    net.send(0, sync::SET_NODE_VALUE, forged).unwrap();
                }
                net.barrier().unwrap();

                let fatal = sync.check_fatal();
                if host == 0 {
                    assert!(matches!(
                        fatal,
                        Err(bsp_sssp::Error::BadGraphHandle { host: 1 })
                    ));
                } else {
                    assert!(fatal.is_ok());
                }
            });
        }
    });
}

#[test]
fn companions_observe_a_missing_host_via_barrier_timeout() {
    let shard = Shard {
        num_hosts: 2,
        id: 0,
        part_offsets: vec![0, 1, 2],
        edges: vec![],
    };

    let mut endpoints =
        LocalCluster::with_barrier_timeout(2, Duration::from_millis(200)).into_iter();
    let net = endpoints.next().unwrap();
    // The peer endpoint stays alive but its host never joins, as after a
    // failed back-end initialization.
    let _absent = endpoints.next().unwrap();

    let graph = Arc::new(PGraph::from_shard(shard).unwrap());
    let backend = BackendKind::Cpu.create(Arc::clone(&graph)).unwrap();
    let result = bsp_sssp::run(graph, backend, Arc::new(net), SsspConfig::default());

    assert!(matches!(
        result,
        Err(bsp_sssp::Error::Net(bsp_net::Error::BarrierTimeout { .. }))
    ));
}
