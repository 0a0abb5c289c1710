//! Wavefront OBJ loading into [`Geometry`].

use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::mesh::Geometry;

#[derive(Debug, Error)]
pub enum ObjError {
    #[error("could not load OBJ {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("OBJ {path:?} contains no triangles")]
    Empty { path: PathBuf },
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

/// Load an OBJ file from disk. Material libraries are ignored.
pub fn load_obj(path: &Path) -> Result<Geometry, ObjError> {
    let (models, _) = tobj::load_obj(path, &load_options()).map_err(|source| ObjError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    merge_models(path, &models)
}

/// Parse OBJ text already in memory.
pub fn parse_obj(text: &str) -> Result<Geometry, ObjError> {
    let path = Path::new("<memory>");
    let mut reader = BufReader::new(Cursor::new(text));
    let (models, _) = tobj::load_obj_buf(&mut reader, &load_options(), |_| Ok(Default::default()))
        .map_err(|source| ObjError::Load {
            path: path.to_path_buf(),
            source,
        })?;
    merge_models(path, &models)
}

// Concatenate every model into one geometry, offsetting indices.
fn merge_models(path: &Path, models: &[tobj::Model]) -> Result<Geometry, ObjError> {
    let mut geometry = Geometry::default();
    for model in models {
        let mesh = &model.mesh;
        let base = geometry.vertex_count() as u32;
        let count = mesh.positions.len() / 3;

        geometry.positions.extend_from_slice(&mesh.positions[..count * 3]);
        for i in 0..count {
            geometry.normals.extend_from_slice(&[
                mesh.normals.get(i * 3).copied().unwrap_or(0.0),
                mesh.normals.get(i * 3 + 1).copied().unwrap_or(0.0),
                mesh.normals.get(i * 3 + 2).copied().unwrap_or(0.0),
            ]);
            geometry.tex_coords.extend_from_slice(&[
                mesh.texcoords.get(i * 2).copied().unwrap_or(0.0),
                1.0 - mesh.texcoords.get(i * 2 + 1).copied().unwrap_or(0.0),
            ]);
        }
        geometry.indices.extend(mesh.indices.iter().map(|i| base + i));
    }

    if geometry.indices.is_empty() {
        return Err(ObjError::Empty {
            path: path.to_path_buf(),
        });
    }
    log::debug!(
        "Loaded OBJ {:?}: {} vertices, {} triangles",
        path,
        geometry.vertex_count(),
        geometry.indices.len() / 3
    );
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn quad_face_is_fan_triangulated() {
        let geometry = parse_obj(SQUARE).unwrap();
        assert_eq!(geometry.vertex_count(), 4);
        assert_eq!(geometry.indices.len(), 6);
        assert_eq!(geometry.normals.len(), 12);
        assert_eq!(geometry.tex_coords.len(), 8);
        assert!(geometry.normals.chunks(3).all(|n| n == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn texture_v_is_flipped() {
        let geometry = parse_obj(SQUARE).unwrap();
        // vt 0 0 becomes (0, 1)
        let uvs: Vec<_> = geometry.tex_coords.chunks(2).map(|t| (t[0], t[1])).collect();
        assert!(uvs.contains(&(0.0, 1.0)));
        assert!(uvs.contains(&(1.0, 0.0)));
    }

    #[test]
    fn positions_only_file_defaults_attributes() {
        let geometry = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(geometry.indices, vec![0, 1, 2]);
        assert!(geometry.normals.iter().all(|&n| n == 0.0));
    }

    #[test]
    fn file_without_faces_is_rejected() {
        let err = parse_obj("v 0 0 0\n").unwrap_err();
        assert!(matches!(err, ObjError::Empty { .. }));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_obj(Path::new("no/such/model.obj")).unwrap_err();
        assert!(matches!(err, ObjError::Load { .. }));
    }
}
