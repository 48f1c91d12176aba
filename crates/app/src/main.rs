use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use log::{info, warn};

use bsp_graph::prelude::*;
use bsp_net::{LocalCluster, LocalTransport, Transport};
use bsp_sssp::{BackendKind, ComputeBackend, SsspConfig};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("sssp: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::parse()?;
    let num_hosts = args.shards.len() as u32;
    let backends = backends_for(args.pset.as_deref(), num_hosts);
    let config = SsspConfig::new(args.src_node, args.max_iterations);

    info!("running {} hosts over the in-process transport", num_hosts);

    let endpoints = LocalCluster::new(num_hosts);
    let mut failures: Vec<(usize, Box<dyn std::error::Error + Send + Sync>)> = Vec::new();

    thread::scope(|scope| {
        let mut handles = Vec::new();
        for ((path, kind), net) in args.shards.iter().zip(&backends).zip(endpoints) {
            let verify = args.verify;
            handles.push(scope.spawn(move || host_main(path, *kind, net, config, verify)));
        }
        for (host, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => failures.push((host, error)),
                Err(_) => failures.push((host, "host thread panicked".into())),
            }
        }
    });

    match failures.into_iter().next() {
        Some((host, error)) => Err(format!("host {host}: {error}").into()),
        None => Ok(()),
    }
}

fn host_main(
    path: &Path,
    kind: BackendKind,
    net: LocalTransport,
    config: SsspConfig,
    verify: bool,
) -> Result<()> {
    let host = net.host_id();
    let num_hosts = net.num_hosts();

    let shard = read_shard(path)?;
    if shard.id != host || shard.num_hosts != num_hosts {
        return Err(format!(
            "{} describes host {} of {}, but was assigned to host {} of {}",
            path.display(),
            shard.id,
            shard.num_hosts,
            host,
            num_hosts
        )
        .into());
    }

    let graph = Arc::new(PGraph::from_shard(shard)?);
    let backend = kind.create(Arc::clone(&graph))?;

    let stats = bsp_sssp::run(Arc::clone(&graph), Arc::clone(&backend), Arc::new(net), config)?;
    info!(
        "host {}: finished after {} rounds (converged: {})",
        host, stats.rounds, stats.converged
    );

    if verify {
        let file_name = distances_file_name(kind, host, num_hosts);
        write_distances(Path::new(&file_name), &graph, backend.as_ref())?;
        info!("host {}: wrote {}", host, file_name);
    }

    Ok(())
}

fn backends_for(pset: Option<&str>, num_hosts: u32) -> Vec<BackendKind> {
    match pset {
        Some(pset) if pset.chars().count() == num_hosts as usize => {
            pset.chars().map(BackendKind::from_pset).collect()
        }
        Some(pset) => {
            warn!(
                "ignoring --pset {:?}: length does not match the host count {}",
                pset, num_hosts
            );
            vec![BackendKind::Cpu; num_hosts as usize]
        }
        None => vec![BackendKind::Cpu; num_hosts as usize],
    }
}

fn distances_file_name(kind: BackendKind, host: HostId, num_hosts: u32) -> String {
    format!("{}_{}_of_{}_distances.csv", kind.name(), host, num_hosts)
}

/// One `<gid>, <distance>` line per owned vertex, ascending by GID.
fn write_distances(
    path: &Path,
    graph: &PGraph,
    backend: &dyn ComputeBackend,
) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for node in graph.owned_nodes() {
        writeln!(out, "{}, {}", graph.l2g(node), backend.node_value(node))?;
    }
    out.flush()
}

mod cli {
    use pico_args::Arguments;
    use std::path::PathBuf;

    #[derive(Debug)]
    pub(crate) struct AppArgs {
        /// One transpose shard per host.
        pub(crate) shards: Vec<PathBuf>,
        pub(crate) max_iterations: usize,
        pub(crate) src_node: u32,
        pub(crate) verify: bool,
        pub(crate) pset: Option<String>,
    }

    pub(crate) fn parse() -> super::Result<AppArgs> {
        let mut pargs = Arguments::from_env();

        let args = AppArgs {
            max_iterations: pargs.opt_value_from_str("--maxIterations")?.unwrap_or(4),
            src_node: pargs.opt_value_from_str("--srcNodeId")?.unwrap_or(0),
            verify: pargs.contains("--verify"),
            pset: pargs.opt_value_from_str("--pset")?,
            shards: pargs.finish().into_iter().map(PathBuf::from).collect(),
        };

        if args.shards.is_empty() {
            return Err("expected at least one shard path (one per host)".into());
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pset_selects_backends_per_host() {
        assert_eq!(
            backends_for(Some("cgo"), 3),
            vec![BackendKind::Cpu, BackendKind::Cuda, BackendKind::OpenCl]
        );
    }

    #[test]
    fn pset_with_wrong_length_is_ignored() {
        assert_eq!(
            backends_for(Some("cg"), 3),
            vec![BackendKind::Cpu; 3]
        );
        assert_eq!(backends_for(None, 2), vec![BackendKind::Cpu; 2]);
    }

    #[test]
    fn distances_file_names_follow_the_backend() {
        assert_eq!(
            distances_file_name(BackendKind::Cpu, 1, 4),
            "cpu_1_of_4_distances.csv"
        );
        assert_eq!(
            distances_file_name(BackendKind::Cuda, 0, 2),
            "gpu_cuda_0_of_2_distances.csv"
        );
    }

    #[test]
    fn verify_output_is_sorted_and_complete() {
        let shard = Shard {
            num_hosts: 2,
            id: 1,
            part_offsets: vec![0, 2, 5],
            edges: vec![(2, 3, 1), (3, 4, 1), (4, 0, 1)],
        };
        let graph = Arc::new(PGraph::from_shard(shard).unwrap());
        let backend = BackendKind::Cpu.create(Arc::clone(&graph)).unwrap();
        backend.set_node_value(0, 4);
        backend.set_node_value(1, 5);
        backend.set_node_value(2, 6);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distances.csv");
        write_distances(&path, &graph, backend.as_ref()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2, 4\n3, 5\n4, 6\n");
    }
}
