//! MilkShape 3D (.ms3d) models.
//!
//! The file is a packed little-endian sequence of sections with no tags:
//! the position in the stream determines the record type.

use std::io::Cursor;

use binrw::{binrw, BinRead, BinReaderExt, BinResult};

use crate::{
    error::{DecodeError, Result},
    format::{from_fixed_name, to_fixed_name},
};

pub const MS3D_MAGIC: &[u8; 10] = b"MS3D000000";
pub const MS3D_HEADER_SIZE: usize = 14;
pub const MS3D_VERTEX_SIZE: usize = 15;
pub const MS3D_TRIANGLE_SIZE: usize = 70;
pub const MS3D_MATERIAL_SIZE: usize = 361;
/// Group flags, name and triangle count, before the index list
pub const MS3D_GROUP_HEADER_SIZE: usize = 35;

#[binrw]
#[brw(magic = b"MS3D000000")]
#[derive(Clone, Debug)]
pub struct Ms3dHeader {
    pub version: i32,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms3dVertex {
    pub flags: u8,
    pub position: [f32; 3],
    /// Joint index, -1 for none
    pub bone: i8,
    pub reference_count: u8,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms3dTriangle {
    pub flags: u16,
    pub indices: [u16; 3],
    pub normals: [[f32; 3]; 3],
    pub s: [f32; 3],
    pub t: [f32; 3],
    pub smoothing_group: u8,
    pub group_index: u8,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms3dGroup {
    pub flags: u8,
    #[br(map = |b: [u8; 32]| from_fixed_name(&b))]
    #[bw(map = |s: &String| to_fixed_name::<32>(s))]
    pub name: String,
    #[bw(try_calc = triangle_indices.len().try_into())]
    pub triangle_count: u16,
    #[br(count = triangle_count)]
    pub triangle_indices: Vec<u16>,
    /// -1 for none
    pub material_index: i8,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms3dMaterial {
    #[br(map = |b: [u8; 32]| from_fixed_name(&b))]
    #[bw(map = |s: &String| to_fixed_name::<32>(s))]
    pub name: String,
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub emissive: [f32; 4],
    pub shininess: f32,
    pub transparency: f32,
    pub mode: u8,
    #[br(map = |b: [u8; 128]| from_fixed_name(&b))]
    #[bw(map = |s: &String| to_fixed_name::<128>(s))]
    pub texture: String,
    #[br(map = |b: [u8; 128]| from_fixed_name(&b))]
    #[bw(map = |s: &String| to_fixed_name::<128>(s))]
    pub alpha_map: String,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms3dAnimation {
    pub fps: f32,
    pub current_time: f32,
    pub total_frames: i32,
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Ms3dKeyframe {
    pub time: f32,
    pub value: [f32; 3],
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms3dJoint {
    pub flags: u8,
    #[br(map = |b: [u8; 32]| from_fixed_name(&b))]
    #[bw(map = |s: &String| to_fixed_name::<32>(s))]
    pub name: String,
    #[br(map = |b: [u8; 32]| from_fixed_name(&b))]
    #[bw(map = |s: &String| to_fixed_name::<32>(s))]
    pub parent_name: String,
    pub rotation: [f32; 3],
    pub position: [f32; 3],
    #[bw(try_calc = rotation_keys.len().try_into())]
    pub rotation_key_count: u16,
    #[bw(try_calc = position_keys.len().try_into())]
    pub position_key_count: u16,
    #[br(count = rotation_key_count)]
    pub rotation_keys: Vec<Ms3dKeyframe>,
    #[br(count = position_key_count)]
    pub position_keys: Vec<Ms3dKeyframe>,
}

fn decode_text(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_string()
}

/// Group, material or joint comment
#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms3dComment {
    pub index: i32,
    #[br(assert(length >= 0))]
    #[bw(try_calc = text.len().try_into())]
    pub length: i32,
    #[br(count = length, map = |b: Vec<u8>| decode_text(b))]
    #[bw(map = |s: &String| s.as_bytes().to_vec())]
    pub text: String,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
struct Ms3dCommentList {
    #[br(assert(comment_count >= 0))]
    #[bw(try_calc = comments.len().try_into())]
    comment_count: i32,
    #[br(count = comment_count)]
    comments: Vec<Ms3dComment>,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
struct Ms3dModelComment {
    #[br(assert(present == 0 || present == 1))]
    #[bw(calc = i32::from(text.is_some()))]
    present: i32,
    #[br(if(present == 1))]
    text: Option<Ms3dText>,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
struct Ms3dText {
    #[br(assert(length >= 0))]
    #[bw(try_calc = text.len().try_into())]
    length: i32,
    #[br(count = length, map = |b: Vec<u8>| decode_text(b))]
    #[bw(map = |s: &String| s.as_bytes().to_vec())]
    text: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms3dComments {
    pub groups: Vec<Ms3dComment>,
    pub materials: Vec<Ms3dComment>,
    pub joints: Vec<Ms3dComment>,
    pub model: Option<String>,
}

/// Vertex extension, sub-version 1
#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Ms3dVertexExtra {
    pub bones: [i8; 3],
    pub weights: [u8; 3],
}

#[derive(Clone, Debug)]
pub struct Ms3dFile {
    pub version: i32,
    pub vertices: Vec<Ms3dVertex>,
    pub triangles: Vec<Ms3dTriangle>,
    pub groups: Vec<Ms3dGroup>,
    pub materials: Vec<Ms3dMaterial>,
    pub animation: Ms3dAnimation,
    pub joints: Vec<Ms3dJoint>,
    pub comments: Ms3dComments,
    pub vertex_extras: Vec<Ms3dVertexExtra>,
}

type Reader<'a> = Cursor<&'a [u8]>;

/// Reads one record at the cursor, mapping failures to the record's start offset.
fn read_record<T>(reader: &mut Reader, what: &str) -> Result<T>
where T: BinRead + for<'a> BinRead<Args<'a> = ()> {
    let offset = reader.position();
    let result: BinResult<T> = reader.read_le();
    result.map_err(|e| DecodeError::from_binrw(e, offset, what))
}

/// Reads a u16 count followed by that many records.
fn read_section<T>(reader: &mut Reader, what: &str) -> Result<Vec<T>>
where T: BinRead + for<'a> BinRead<Args<'a> = ()> {
    let count: u16 = read_record(reader, what)?;
    (0..count).map(|_| read_record(reader, what)).collect()
}

fn read_i32(reader: &mut Reader, what: &str) -> Result<i32> { read_record(reader, what) }

impl Ms3dFile {
    /// Decodes a complete MS3D buffer. Every section must be present and
    /// decoding must end exactly at the end of the buffer.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);

        let header: Ms3dHeader = read_record(&mut reader, "header")?;
        if !(3..=4).contains(&header.version) {
            return Err(DecodeError::UnsupportedVersion {
                offset: MS3D_MAGIC.len() as u64,
                what: "MS3D",
                value: header.version,
            });
        }

        let vertices: Vec<Ms3dVertex> = read_section(&mut reader, "vertex")?;
        let triangles: Vec<Ms3dTriangle> = read_section(&mut reader, "triangle")?;
        let groups: Vec<Ms3dGroup> = read_section(&mut reader, "group")?;
        let materials: Vec<Ms3dMaterial> = read_section(&mut reader, "material")?;
        let animation: Ms3dAnimation = read_record(&mut reader, "animation header")?;
        let joints: Vec<Ms3dJoint> = read_section(&mut reader, "joint")?;
        log::debug!(
            "MS3D v{}: {} vertices, {} triangles, {} groups, {} materials, {} joints",
            header.version,
            vertices.len(),
            triangles.len(),
            groups.len(),
            materials.len(),
            joints.len()
        );

        let offset = reader.position();
        let comment_version = read_i32(&mut reader, "comment sub-version")?;
        if comment_version != 1 {
            return Err(DecodeError::UnsupportedVersion {
                offset,
                what: "comment",
                value: comment_version,
            });
        }
        let group_comments: Ms3dCommentList = read_record(&mut reader, "group comment")?;
        let material_comments: Ms3dCommentList = read_record(&mut reader, "material comment")?;
        let joint_comments: Ms3dCommentList = read_record(&mut reader, "joint comment")?;
        let model: Ms3dModelComment = read_record(&mut reader, "model comment")?;
        let comments = Ms3dComments {
            groups: group_comments.comments,
            materials: material_comments.comments,
            joints: joint_comments.comments,
            model: model.text.map(|t| t.text),
        };

        let offset = reader.position();
        let vertex_version = read_i32(&mut reader, "vertex extension sub-version")?;
        let vertex_extras = match vertex_version {
            1 => (0..vertices.len())
                .map(|_| read_record(&mut reader, "vertex extension"))
                .collect::<Result<Vec<Ms3dVertexExtra>>>()?,
            // Sub-version 2 adds a per-vertex color whose layout is not handled
            value => {
                return Err(DecodeError::UnsupportedVersion {
                    offset,
                    what: "vertex extension",
                    value,
                })
            }
        };

        let end = reader.position();
        if end != data.len() as u64 {
            return Err(DecodeError::corrupt(
                end,
                format!("{} trailing bytes", data.len() as u64 - end),
            ));
        }

        Ok(Self {
            version: header.version,
            vertices,
            triangles,
            groups,
            materials,
            animation,
            joints,
            comments,
            vertex_extras,
        })
    }

    fn vertices_end(&self) -> usize {
        MS3D_HEADER_SIZE + 2 + self.vertices.len() * MS3D_VERTEX_SIZE
    }

    /// Absolute offset of triangle record `index` in the source buffer.
    pub fn triangle_offset(&self, index: usize) -> u64 {
        (self.vertices_end() + 2 + index * MS3D_TRIANGLE_SIZE) as u64
    }

    /// Absolute offset of group record `index` in the source buffer.
    pub fn group_offset(&self, index: usize) -> u64 {
        let start = self.vertices_end() + 2 + self.triangles.len() * MS3D_TRIANGLE_SIZE + 2;
        let skipped: usize = self.groups[..index]
            .iter()
            .map(|g| MS3D_GROUP_HEADER_SIZE + g.triangle_indices.len() * 2 + 1)
            .sum();
        (start + skipped) as u64
    }
}

#[cfg(test)]
mod tests {
    use binrw::{BinWrite, BinWriterExt};

    use super::*;

    #[derive(Default)]
    struct Builder {
        out: Cursor<Vec<u8>>,
    }

    impl Builder {
        fn new(version: i32) -> Self {
            let mut b = Self::default();
            b.record(&Ms3dHeader { version });
            b
        }

        fn record<T>(&mut self, value: &T) -> &mut Self
        where T: BinWrite + for<'a> BinWrite<Args<'a> = ()> {
            self.out.write_le(value).unwrap();
            self
        }

        fn section<T>(&mut self, values: &[T]) -> &mut Self
        where T: BinWrite + for<'a> BinWrite<Args<'a> = ()> {
            self.record(&(values.len() as u16));
            for value in values {
                self.record(value);
            }
            self
        }

        fn tail(&mut self, vertex_count: usize, vertex_version: i32) -> &mut Self {
            self.record(&Ms3dAnimation { fps: 24.0, current_time: 0.0, total_frames: 30 })
                .section::<Ms3dJoint>(&[])
                // comment sub-version, then group/material/joint/model comment counts
                .record(&1i32)
                .record(&0i32)
                .record(&0i32)
                .record(&0i32)
                .record(&0i32)
                .record(&vertex_version);
            for _ in 0..vertex_count {
                self.record(&Ms3dVertexExtra::default());
            }
            self
        }

        fn finish(&mut self) -> Vec<u8> { std::mem::take(&mut self.out).into_inner() }
    }

    fn vertex(x: f32, y: f32, z: f32) -> Ms3dVertex {
        Ms3dVertex { position: [x, y, z], bone: -1, ..Default::default() }
    }

    fn minimal(vertex_version: i32) -> Vec<u8> {
        let vertices = [vertex(0.0, 0.0, 0.0), vertex(1.0, 0.0, 0.0), vertex(0.0, 1.0, 0.0)];
        let triangle = Ms3dTriangle { indices: [0, 1, 2], ..Default::default() };
        let group = Ms3dGroup {
            name: "body".into(),
            triangle_indices: vec![0],
            material_index: -1,
            ..Default::default()
        };
        Builder::new(4)
            .section(&vertices)
            .section(&[triangle])
            .section(&[group])
            .section::<Ms3dMaterial>(&[])
            .tail(vertices.len(), vertex_version)
            .finish()
    }

    #[test]
    fn record_sizes_match_packed_layout() {
        let mut b = Builder::default();
        assert_eq!(b.record(&Ms3dVertex::default()).finish().len(), MS3D_VERTEX_SIZE);
        assert_eq!(b.record(&Ms3dTriangle::default()).finish().len(), MS3D_TRIANGLE_SIZE);
        assert_eq!(b.record(&Ms3dMaterial::default()).finish().len(), MS3D_MATERIAL_SIZE);
        assert_eq!(b.record(&Ms3dHeader { version: 4 }).finish().len(), MS3D_HEADER_SIZE);
    }

    #[test]
    fn decodes_minimal_file() {
        let file = Ms3dFile::read(&minimal(1)).unwrap();
        assert_eq!(file.version, 4);
        assert_eq!(file.vertices.len(), 3);
        assert_eq!(file.vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(file.groups[0].name, "body");
        assert_eq!(file.groups[0].triangle_indices, vec![0]);
        assert_eq!(file.groups[0].material_index, -1);
        assert_eq!(file.animation.total_frames, 30);
        assert_eq!(file.vertex_extras.len(), 3);
        assert_eq!(file.triangle_offset(0), 63);
        assert_eq!(file.group_offset(0), 135);
    }

    #[test]
    fn decodes_variable_length_records() {
        let joint = Ms3dJoint {
            name: "hip".into(),
            parent_name: String::new(),
            rotation_keys: vec![Ms3dKeyframe { time: 0.5, value: [1.0, 2.0, 3.0] }],
            position_keys: vec![Ms3dKeyframe::default(); 2],
            ..Default::default()
        };
        let groups = [
            Ms3dGroup { name: "a".into(), triangle_indices: vec![], ..Default::default() },
            Ms3dGroup { name: "b".into(), triangle_indices: vec![0, 0], ..Default::default() },
        ];
        let material = Ms3dMaterial {
            name: "skin".into(),
            texture: "skin.png".into(),
            ..Default::default()
        };
        let data = Builder::new(4)
            .section::<Ms3dVertex>(&[])
            .section::<Ms3dTriangle>(&[])
            .section(&groups)
            .section(&[material])
            .record(&Ms3dAnimation::default())
            .section(&[joint.clone()])
            .record(&1i32)
            // one group comment
            .record(&1i32)
            .record(&1i32)
            .record(&5i32)
            .record(b"hello")
            .record(&0i32)
            .record(&0i32)
            // model comment
            .record(&1i32)
            .record(&2i32)
            .record(b"hi")
            .record(&1i32)
            .finish();

        let file = Ms3dFile::read(&data).unwrap();
        assert_eq!(file.groups.len(), 2);
        assert_eq!(file.groups[1].triangle_indices, vec![0, 0]);
        assert_eq!(file.group_offset(0), 20);
        assert_eq!(file.group_offset(1), 56);
        assert_eq!(&data[57..58], b"b");
        assert_eq!(file.materials[0].texture, "skin.png");
        assert_eq!(file.joints, vec![joint]);
        assert_eq!(file.comments.groups, vec![Ms3dComment { index: 1, text: "hello".into() }]);
        assert_eq!(file.comments.model.as_deref(), Some("hi"));
    }

    /// An empty model up to the comment sub-version, followed by `comments`.
    fn with_comments(comments: &[i32]) -> Vec<u8> {
        let mut b = Builder::new(4);
        b.section::<Ms3dVertex>(&[])
            .section::<Ms3dTriangle>(&[])
            .section::<Ms3dGroup>(&[])
            .section::<Ms3dMaterial>(&[])
            .record(&Ms3dAnimation::default())
            .section::<Ms3dJoint>(&[])
            .record(&1i32);
        for value in comments {
            b.record(value);
        }
        b.record(&1i32).finish()
    }

    #[test]
    fn written_comment_records_decode() {
        let comments = Ms3dCommentList {
            comments: vec![Ms3dComment { index: 0, text: "left arm".into() }],
        };
        let data = Builder::new(4)
            .section::<Ms3dVertex>(&[])
            .section::<Ms3dTriangle>(&[])
            .section::<Ms3dGroup>(&[])
            .section::<Ms3dMaterial>(&[])
            .record(&Ms3dAnimation::default())
            .section::<Ms3dJoint>(&[])
            .record(&1i32)
            .record(&Ms3dCommentList::default())
            .record(&comments)
            .record(&Ms3dCommentList::default())
            .record(&Ms3dModelComment { text: None })
            .record(&1i32)
            .finish();
        let file = Ms3dFile::read(&data).unwrap();
        assert_eq!(file.comments.materials, comments.comments);
        assert!(file.comments.groups.is_empty());
        assert_eq!(file.comments.model, None);
    }

    #[test]
    fn negative_comment_length_is_corrupt() {
        // one group comment, index 0, length -1
        match Ms3dFile::read(&with_comments(&[1, 0, -1, 0, 0, 0])) {
            Err(DecodeError::StructuralCorruption { offset, message }) => {
                assert_eq!(offset, 40);
                assert!(message.contains("group comment"), "{message}");
            }
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn model_comment_flag_must_be_boolean() {
        assert!(Ms3dFile::read(&with_comments(&[0, 0, 0, 0])).is_ok());
        match Ms3dFile::read(&with_comments(&[0, 0, 0, 2])) {
            Err(DecodeError::StructuralCorruption { offset, .. }) => assert_eq!(offset, 52),
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut data = minimal(1);
        data.push(0);
        match Ms3dFile::read(&data) {
            Err(DecodeError::StructuralCorruption { offset, .. }) => {
                assert_eq!(offset, data.len() as u64 - 1)
            }
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_bytes() {
        let mut data = minimal(1);
        data.truncate(data.len() - 1);
        assert!(matches!(Ms3dFile::read(&data), Err(DecodeError::Truncation { .. })));
    }

    #[test]
    fn rejects_unknown_vertex_extension() {
        for version in [2, 3] {
            match Ms3dFile::read(&minimal(version)) {
                Err(DecodeError::UnsupportedVersion { value, what, .. }) => {
                    assert_eq!(value, version);
                    assert_eq!(what, "vertex extension");
                }
                other => panic!("expected unsupported version, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = minimal(1);
        data[0] = b'X';
        assert!(matches!(Ms3dFile::read(&data), Err(DecodeError::StructuralCorruption { .. })));
    }
}
