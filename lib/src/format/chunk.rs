//! Tagged, length-prefixed chunk trees (3DS).

use std::{fmt::Write, io::Cursor};

use binrw::{binrw, BinReaderExt, BinResult, NullString};
use glam::Vec2;
use strum::IntoStaticStr;

use crate::{
    error::{DecodeError, Result},
    format::tds::{
        Face, FaceList, FaceMaterial, HierarchyLink, MeshMatrix, SmoothGroupList, TexcoordList,
        VertexList, Vertices,
    },
};

// Main file chunk
pub const K_CHUNK_MAIN: u16 = 0x4D4D;
// 3D editor
pub const K_CHUNK_EDITOR: u16 = 0x3D3D;
// Named object
pub const K_CHUNK_OBJECT: u16 = 0x4000;
// Triangle mesh
pub const K_CHUNK_MESH: u16 = 0x4100;
// Vertex list
pub const K_CHUNK_VERTICES: u16 = 0x4110;
// Face list
pub const K_CHUNK_FACES: u16 = 0x4120;
// Faces per material
pub const K_CHUNK_FACE_MATERIAL: u16 = 0x4130;
// Mapping coordinates
pub const K_CHUNK_TEXCOORDS: u16 = 0x4140;
// Smoothing groups
pub const K_CHUNK_SMOOTH_GROUP: u16 = 0x4150;
// Local coordinate system
pub const K_CHUNK_MATRIX: u16 = 0x4160;
// Keyframer
pub const K_CHUNK_KEYFRAMER: u16 = 0xB000;
// Keyframer mesh information
pub const K_CHUNK_OBJECT_DESCRIPTION: u16 = 0xB002;
// Keyframer node header
pub const K_CHUNK_HIERARCHY_LINK: u16 = 0xB010;

pub const CHUNK_HEADER_SIZE: usize = 6;

// Bounds recursion on hostile input
const MAX_DEPTH: usize = 64;

#[binrw]
#[derive(Clone, Debug, Default)]
pub struct ChunkHeader {
    pub tag: u16,
    /// Total length, header included
    pub length: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ChunkKind {
    Main,
    Editor,
    Object,
    Mesh,
    Vertices,
    Faces,
    FaceMaterial,
    Texcoords,
    SmoothGroup,
    Matrix,
    Keyframer,
    ObjectDescription,
    HierarchyLink,
    Unknown(u16),
}

impl ChunkKind {
    pub fn from_tag(tag: u16) -> Self {
        match tag {
            K_CHUNK_MAIN => Self::Main,
            K_CHUNK_EDITOR => Self::Editor,
            K_CHUNK_OBJECT => Self::Object,
            K_CHUNK_MESH => Self::Mesh,
            K_CHUNK_VERTICES => Self::Vertices,
            K_CHUNK_FACES => Self::Faces,
            K_CHUNK_FACE_MATERIAL => Self::FaceMaterial,
            K_CHUNK_TEXCOORDS => Self::Texcoords,
            K_CHUNK_SMOOTH_GROUP => Self::SmoothGroup,
            K_CHUNK_MATRIX => Self::Matrix,
            K_CHUNK_KEYFRAMER => Self::Keyframer,
            K_CHUNK_OBJECT_DESCRIPTION => Self::ObjectDescription,
            K_CHUNK_HIERARCHY_LINK => Self::HierarchyLink,
            tag => Self::Unknown(tag),
        }
    }

    /// Lowercase role name, `unknown` for unrecognized tags.
    pub fn name(self) -> &'static str { self.into() }
}

/// Decoded payload of a chunk.
#[derive(Clone, Debug, Default)]
pub enum ChunkData {
    /// Container chunk, or an unknown chunk whose body parsed as children
    #[default]
    None,
    Vertices(Vertices),
    Faces(Vec<Face>),
    Texcoords(Vec<Vec2>),
    Matrix(MeshMatrix),
    SmoothGroup(Vec<u32>),
    FaceMaterial(FaceMaterial),
    ObjectName(String),
    HierarchyLink(HierarchyLink),
    /// Unknown chunk body that is not a chunk sequence
    Opaque(Vec<u8>),
}

#[derive(Copy, Clone, Debug, Default)]
struct ReadContext {
    depth: usize,
    /// Face count of the enclosing face list, for smoothing groups
    face_count: Option<usize>,
}

impl ChunkData {
    /// Decodes the payload at the start of `body`, returning it with the
    /// number of bytes it consumed. `offset` is the absolute offset of `body`.
    fn read(kind: ChunkKind, body: &[u8], offset: u64, ctx: ReadContext) -> Result<(Self, usize)> {
        let mut reader = Cursor::new(body);
        // The window ends at the chunk boundary, so running out of bytes is an overrun
        let map_err = |e| match DecodeError::from_binrw(e, offset, kind.name()) {
            DecodeError::Truncation { .. } => {
                DecodeError::corrupt(offset, format!("{} payload overruns its chunk", kind.name()))
            }
            e => e,
        };
        let data = match kind {
            ChunkKind::Vertices => {
                let list: VertexList = reader.read_le().map_err(map_err)?;
                Self::Vertices(Vertices::weld(&list.positions))
            }
            ChunkKind::Faces => {
                let list: FaceList = reader.read_le().map_err(map_err)?;
                Self::Faces(list.faces)
            }
            ChunkKind::Texcoords => {
                let list: TexcoordList = reader.read_le().map_err(map_err)?;
                Self::Texcoords(list.uvs.iter().map(|&[u, v]| Vec2::new(u, 1.0 - v)).collect())
            }
            ChunkKind::Matrix => Self::Matrix(reader.read_le().map_err(map_err)?),
            ChunkKind::SmoothGroup => {
                let Some(face_count) = ctx.face_count else {
                    return Err(DecodeError::corrupt(offset, "smoothing groups outside a face list"));
                };
                if body.len() != face_count * 4 {
                    return Err(DecodeError::corrupt(
                        offset,
                        format!(
                            "smoothing group array is {} bytes for {face_count} faces",
                            body.len()
                        ),
                    ));
                }
                let list: SmoothGroupList = reader.read_le_args((face_count,)).map_err(map_err)?;
                Self::SmoothGroup(list.groups)
            }
            ChunkKind::FaceMaterial => Self::FaceMaterial(reader.read_le().map_err(map_err)?),
            ChunkKind::Object => {
                let name: NullString = reader.read_le().map_err(map_err)?;
                Self::ObjectName(name.to_string())
            }
            ChunkKind::HierarchyLink => Self::HierarchyLink(reader.read_le().map_err(map_err)?),
            ChunkKind::Main
            | ChunkKind::Editor
            | ChunkKind::Mesh
            | ChunkKind::Keyframer
            | ChunkKind::ObjectDescription
            | ChunkKind::Unknown(_) => Self::None,
        };
        Ok((data, reader.position() as usize))
    }
}

/// A node of the chunk tree.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    /// Absolute offset of the chunk header
    pub offset: u64,
    pub tag: u16,
    pub kind: ChunkKind,
    /// Declared length, header included
    pub length: u32,
    /// Bytes consumed by the payload, between the header and the children
    pub payload_size: u32,
    pub data: ChunkData,
    pub children: Vec<Chunk>,
}

impl Default for ChunkKind {
    fn default() -> Self { Self::Unknown(0) }
}

impl Chunk {
    /// Decodes the chunk tree rooted at the start of `data`.
    pub fn read(data: &[u8]) -> Result<Chunk> {
        let root = read_chunk(data, 0, data.len(), ReadContext::default())?;
        let end = root.length as usize;
        if end != data.len() {
            log::warn!("Ignoring {} trailing bytes after root chunk", data.len() - end);
        }
        Ok(root)
    }

    #[inline]
    pub fn name(&self) -> &'static str { self.kind.name() }

    /// Children of the given kind, in file order.
    pub fn children_of(&self, kind: ChunkKind) -> impl Iterator<Item = &Chunk> + '_ {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    /// Children with the given role name (case-insensitive), in file order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Chunk> + 'a {
        self.children.iter().filter(move |c| c.name().eq_ignore_ascii_case(name))
    }

    /// First child of the given kind.
    pub fn find(&self, kind: ChunkKind) -> Option<&Chunk> { self.children_of(kind).next() }

    /// The only child of the given kind. Missing or repeated children are errors.
    pub fn child(&self, kind: ChunkKind) -> Result<&Chunk> {
        let mut iter = self.children_of(kind);
        match (iter.next(), iter.next()) {
            (Some(chunk), None) => Ok(chunk),
            (None, _) => Err(DecodeError::corrupt(
                self.offset,
                format!("{} chunk has no {} child", self.name(), kind.name()),
            )),
            (Some(_), Some(dup)) => Err(DecodeError::corrupt(
                dup.offset,
                format!("{} chunk has more than one {} child", self.name(), kind.name()),
            )),
        }
    }

    /// Header, payload and children sizes summed. Equals `length` for every decoded chunk.
    pub fn consumed_size(&self) -> u64 {
        CHUNK_HEADER_SIZE as u64
            + self.payload_size as u64
            + self.children.iter().map(|c| c.length as u64).sum::<u64>()
    }

    /// Renders the tree as `TAG: name` lines, indented by depth.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, indent: usize) {
        let _ = writeln!(out, "{}{:04X}: {}", "  ".repeat(indent), self.tag, self.name());
        for child in &self.children {
            child.dump_into(out, indent + 1);
        }
    }
}

fn read_chunk(data: &[u8], offset: usize, end: usize, ctx: ReadContext) -> Result<Chunk> {
    if ctx.depth > MAX_DEPTH {
        return Err(DecodeError::corrupt(offset as u64, "chunk nesting too deep"));
    }
    let body_start = offset + CHUNK_HEADER_SIZE;
    if body_start > data.len() {
        return Err(DecodeError::truncated(offset as u64, "chunk header"));
    }
    if body_start > end {
        return Err(DecodeError::corrupt(
            offset as u64,
            format!("{} bytes left over in parent chunk", end - offset),
        ));
    }
    let header: ChunkHeader = Cursor::new(&data[offset..body_start])
        .read_le()
        .map_err(|e| DecodeError::from_binrw(e, offset as u64, "chunk header"))?;
    let length = header.length as usize;
    if length < CHUNK_HEADER_SIZE {
        return Err(DecodeError::truncated(
            offset as u64,
            format!("chunk {:#06X} declaring length {length}", header.tag),
        ));
    }
    let chunk_end = offset.saturating_add(length);
    if chunk_end > data.len() {
        return Err(DecodeError::truncated(
            offset as u64,
            format!("chunk {:#06X} of length {length}", header.tag),
        ));
    }
    if chunk_end > end {
        return Err(DecodeError::corrupt(
            offset as u64,
            format!("chunk {:#06X} overruns its parent by {} bytes", header.tag, chunk_end - end),
        ));
    }

    let kind = ChunkKind::from_tag(header.tag);
    let body = &data[body_start..chunk_end];
    log::trace!("{}{:04X} {} at {offset:#x}", "  ".repeat(ctx.depth), header.tag, kind.name());

    let child_depth = ctx.depth + 1;
    let (data_out, payload_size, children) = if let ChunkKind::Unknown(tag) = kind {
        let child_ctx = ReadContext { depth: child_depth, face_count: None };
        if frames_chunks(data, body_start, chunk_end) {
            (ChunkData::None, 0, read_chunks(data, body_start, chunk_end, child_ctx)?)
        } else {
            log::debug!("Keeping chunk {tag:#06X} at {offset:#x} opaque");
            (ChunkData::Opaque(body.to_vec()), body.len(), Vec::new())
        }
    } else {
        let (payload, payload_size) = ChunkData::read(kind, body, body_start as u64, ctx)?;
        let face_count = match &payload {
            ChunkData::Faces(faces) => Some(faces.len()),
            _ => None,
        };
        let child_ctx = ReadContext { depth: child_depth, face_count };
        let children = read_chunks(data, body_start + payload_size, chunk_end, child_ctx)?;
        (payload, payload_size, children)
    };

    Ok(Chunk {
        offset: offset as u64,
        tag: header.tag,
        kind,
        length: header.length,
        payload_size: payload_size as u32,
        data: data_out,
        children,
    })
}

/// Whether `data[start..end]` splits into sibling chunk headers whose
/// declared lengths fill it exactly. Payloads are not inspected.
fn frames_chunks(data: &[u8], start: usize, end: usize) -> bool {
    let mut pos = start;
    while pos < end {
        if end - pos < CHUNK_HEADER_SIZE {
            return false;
        }
        let header: BinResult<ChunkHeader> =
            Cursor::new(&data[pos..pos + CHUNK_HEADER_SIZE]).read_le();
        match header {
            Ok(h) if (CHUNK_HEADER_SIZE..=end - pos).contains(&(h.length as usize)) => {
                pos += h.length as usize;
            }
            _ => return false,
        }
    }
    true
}

/// Decodes sibling chunks filling `data[start..end]` exactly.
fn read_chunks(data: &[u8], start: usize, end: usize, ctx: ReadContext) -> Result<Vec<Chunk>> {
    let mut children = Vec::new();
    let mut pos = start;
    while pos < end {
        let child = read_chunk(data, pos, end, ctx)?;
        pos += child.length as usize;
        children.push(child);
    }
    Ok(children)
}
