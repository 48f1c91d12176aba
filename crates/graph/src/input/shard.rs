use std::fs::File;
use std::path::Path;

use linereader::LineReader;

use crate::{Error, Gid, HostId, Weight};

/// One host's slice of a pre-partitioned graph.
///
/// The textual shard format is line oriented:
///
/// ```text
/// # comment
/// hosts <num_hosts> <host_id>
/// parts <offset_0> <offset_1> ... <offset_num_hosts>
/// <src> <dst> <weight>
/// ...
/// ```
///
/// The `parts` line carries the global offset of every host's owned range
/// plus the total vertex count. Edge sources must be owned by `host_id`;
/// targets may belong to any host.
#[derive(Debug, Clone)]
pub struct Shard {
    pub num_hosts: u32,
    pub id: HostId,
    pub part_offsets: Vec<Gid>,
    pub edges: Vec<(Gid, Gid, Weight)>,
}

/// Reads a shard file.
pub fn read_shard<P: AsRef<Path>>(path: P) -> Result<Shard, Error> {
    let file = File::open(path.as_ref())?;
    let mut reader = LineReader::new(file);

    let mut header: Option<(u32, HostId)> = None;
    let mut part_offsets: Option<Vec<Gid>> = None;
    let mut edges = Vec::new();
    let mut lineno = 0_usize;

    while let Some(line) = reader.next_line() {
        let line = line?;
        lineno += 1;

        let mut fields = line
            .split(|byte: &u8| byte.is_ascii_whitespace())
            .filter(|field| !field.is_empty());

        let first = match fields.next() {
            Some(field) => field,
            None => continue,
        };
        if first.starts_with(b"#") {
            continue;
        }

        match first {
            b"hosts" => {
                if header.is_some() {
                    return Err(syntax(lineno, "duplicate hosts line"));
                }
                let num_hosts = int_field(&mut fields, lineno)?;
                let id = int_field(&mut fields, lineno)?;
                header = Some((num_hosts, id));
            }
            b"parts" => {
                if part_offsets.is_some() {
                    return Err(syntax(lineno, "duplicate parts line"));
                }
                let (num_hosts, _) =
                    header.ok_or_else(|| syntax(lineno, "parts line before hosts line"))?;
                let mut offsets = Vec::with_capacity(num_hosts as usize + 1);
                for field in fields {
                    offsets.push(parse_int(field, lineno)?);
                }
                if offsets.len() != num_hosts as usize + 1 {
                    return Err(syntax(
                        lineno,
                        &format!(
                            "expected {} partition offsets, got {}",
                            num_hosts + 1,
                            offsets.len()
                        ),
                    ));
                }
                part_offsets = Some(offsets);
            }
            src => {
                if part_offsets.is_none() {
                    return Err(syntax(lineno, "edge line before parts line"));
                }
                let src = parse_int(src, lineno)?;
                let dst = int_field(&mut fields, lineno)?;
                let weight = int_field(&mut fields, lineno)?;
                if fields.next().is_some() {
                    return Err(syntax(lineno, "trailing fields on edge line"));
                }
                edges.push((src, dst, weight));
            }
        }
    }

    let (num_hosts, id) = header.ok_or_else(|| Error::InvalidShard("missing hosts line".into()))?;
    let part_offsets =
        part_offsets.ok_or_else(|| Error::InvalidShard("missing parts line".into()))?;

    Ok(Shard {
        num_hosts,
        id,
        part_offsets,
        edges,
    })
}

fn int_field<'a, I: Iterator<Item = &'a [u8]>>(fields: &mut I, lineno: usize) -> Result<u32, Error> {
    let field = fields
        .next()
        .ok_or_else(|| syntax(lineno, "missing field"))?;
    parse_int(field, lineno)
}

fn parse_int(field: &[u8], lineno: usize) -> Result<u32, Error> {
    atoi::atoi::<u32>(field).ok_or_else(|| {
        syntax(
            lineno,
            &format!(
                "expected an unsigned integer, got {:?}",
                String::from_utf8_lossy(field)
            ),
        )
    })
}

fn syntax(lineno: usize, message: &str) -> Error {
    Error::InvalidShard(format!("line {lineno}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_shard(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_a_shard() {
        let file = write_shard(
            "# transpose shard, host 0 of 2\n\
             hosts 2 0\n\
             parts 0 2 4\n\
             0 1 5\n\
             1 2 2\n",
        );
        let shard = read_shard(file.path()).unwrap();
        assert_eq!(shard.num_hosts, 2);
        assert_eq!(shard.id, 0);
        assert_eq!(shard.part_offsets, vec![0, 2, 4]);
        assert_eq!(shard.edges, vec![(0, 1, 5), (1, 2, 2)]);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let file = write_shard("hosts 1 0\n\n# nothing to see\nparts 0 1\n");
        let shard = read_shard(file.path()).unwrap();
        assert!(shard.edges.is_empty());
    }

    #[test]
    fn rejects_edges_before_header() {
        let file = write_shard("0 1 5\nhosts 1 0\nparts 0 2\n");
        assert!(matches!(
            read_shard(file.path()),
            Err(Error::InvalidShard(_))
        ));
    }

    #[test]
    fn rejects_wrong_offset_count() {
        let file = write_shard("hosts 2 0\nparts 0 4\n");
        assert!(matches!(
            read_shard(file.path()),
            Err(Error::InvalidShard(_))
        ));
    }

    #[test]
    fn rejects_garbage_fields() {
        let file = write_shard("hosts 2 0\nparts 0 2 4\n0 one 5\n");
        assert!(matches!(
            read_shard(file.path()),
            Err(Error::InvalidShard(_))
        ));
    }

    #[test]
    fn roundtrips_through_pgraph() {
        let file = write_shard(
            "hosts 2 1\n\
             parts 0 2 4\n\
             2 3 1\n\
             3 0 9\n",
        );
        let shard = read_shard(file.path()).unwrap();
        let graph = crate::PGraph::from_shard(shard).unwrap();
        assert_eq!(graph.host_id(), 1);
        assert_eq!(graph.num_owned(), 2);
        // Vertex 0 is a ghost here.
        assert_eq!(graph.ghost_nodes().len(), 1);
        assert_eq!(graph.host_of(graph.l2g(2)).unwrap(), 0);
    }
}
