use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use stl_io::IndexedMesh;

use crate::error::{Error, Result};

/// Indexed triangle mesh, polygons already fanned into triangles.
#[derive(Clone, Debug, Default)]
pub struct TriangleMesh {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[usize; 3]>,
}

impl From<IndexedMesh> for TriangleMesh {
    fn from(mesh: IndexedMesh) -> Self {
        Self {
            vertices: mesh.vertices.iter().map(|v| v.0).collect(),
            faces: mesh.faces.iter().map(|f| f.vertices).collect(),
        }
    }
}

pub fn is_mesh_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("off" | "stl")
    )
}

/// Loads an `.off` or `.stl` mesh.
pub fn load_mesh(path: &Path) -> Result<TriangleMesh> {
    if !path.is_file() {
        return Err(Error::MissingAsset(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("off") => parse_off(BufReader::new(File::open(path)?), path),
        Some("stl") => {
            let mut file = File::open(path)?;
            Ok(stl_io::read_stl(&mut file)?.into())
        }
        _ => Err(Error::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: "unsupported mesh format".into(),
        }),
    }
}

/// Object File Format: `OFF`, then `vertices faces edges`, then the vertex
/// coordinates, then one `n i_1 .. i_n` polygon per line.
pub fn parse_off<R: BufRead>(reader: R, path: &Path) -> Result<TriangleMesh> {
    let parse_error = |line: usize, message: String| Error::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    // (line number, tokens) of every non-empty line, comments stripped
    let mut lines = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or_default();
        let tokens: Vec<String> = content.split_whitespace().map(String::from).collect();
        if !tokens.is_empty() {
            lines.push((i + 1, tokens));
        }
    }
    let mut lines = lines.into_iter();

    let (header_line, mut header) = lines
        .next()
        .ok_or_else(|| parse_error(1, "empty file".into()))?;
    // some exporters glue the counts to the keyword: "OFF8 6 0"
    let keyword = header.remove(0);
    let glued = keyword
        .strip_prefix("OFF")
        .ok_or_else(|| parse_error(header_line, format!("expected OFF, found {keyword:?}")))?;
    if !glued.is_empty() {
        header.insert(0, glued.to_string());
    }
    let (counts_line, counts) = if header.is_empty() {
        lines
            .next()
            .ok_or_else(|| parse_error(header_line, "missing element counts".into()))?
    } else {
        (header_line, header)
    };

    let parse_usize = |line: usize, token: &str| {
        token
            .parse::<usize>()
            .map_err(|e| parse_error(line, format!("{token:?}: {e}")))
    };
    if counts.len() < 2 {
        return Err(parse_error(counts_line, "expected vertex and face counts".into()));
    }
    let num_vertices = parse_usize(counts_line, &counts[0])?;
    let num_faces = parse_usize(counts_line, &counts[1])?;

    let mut mesh = TriangleMesh {
        vertices: Vec::with_capacity(num_vertices),
        faces: Vec::with_capacity(num_faces),
    };

    for _ in 0..num_vertices {
        let (line, tokens) = lines
            .next()
            .ok_or_else(|| parse_error(counts_line, "missing vertices".into()))?;
        if tokens.len() < 3 {
            return Err(parse_error(line, "expected 3 coordinates".into()));
        }
        let mut vertex = [0.0f32; 3];
        for (value, token) in vertex.iter_mut().zip(&tokens) {
            *value = token
                .parse()
                .map_err(|e| parse_error(line, format!("{token:?}: {e}")))?;
        }
        mesh.vertices.push(vertex);
    }

    for _ in 0..num_faces {
        let (line, tokens) = lines
            .next()
            .ok_or_else(|| parse_error(counts_line, "missing faces".into()))?;
        let arity = parse_usize(line, &tokens[0])?;
        if arity < 3 || tokens.len() < arity + 1 {
            return Err(parse_error(line, format!("malformed polygon of arity {arity}")));
        }
        let indices = tokens[1..=arity]
            .iter()
            .map(|token| {
                let index = parse_usize(line, token)?;
                if index >= num_vertices {
                    return Err(parse_error(line, format!("vertex {index} out of range")));
                }
                Ok(index)
            })
            .collect::<Result<Vec<_>>>()?;
        // triangle fan around the first vertex
        for pair in indices[1..].windows(2) {
            mesh.faces.push([indices[0], pair[0], pair[1]]);
        }
    }

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const QUAD: &str = "OFF\n# unit square\n4 1 0\n0 0 0\n1 0 0\n1 1 0\n0 1 0\n4 0 1 2 3\n";

    #[test]
    fn parses_and_fans_polygons() {
        let mesh = parse_off(Cursor::new(QUAD), Path::new("quad.off")).unwrap();

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[2], [1.0, 1.0, 0.0]);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn parses_counts_glued_to_header() {
        let source = "OFF3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";
        let mesh = parse_off(Cursor::new(source), Path::new("tri.off")).unwrap();

        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn rejects_out_of_range_vertex() {
        let source = "OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 7\n";
        let result = parse_off(Cursor::new(source), Path::new("bad.off"));

        assert!(matches!(result, Err(Error::Parse { line: 6, .. })));
    }

    #[test]
    fn missing_file_is_a_missing_asset() {
        let result = load_mesh(Path::new("does/not/exist.off"));

        assert!(matches!(result, Err(Error::MissingAsset(_))));
    }
}
