use crate::types::{NID_TYPE_MASK, NodeId};

/// Type tag carried in the low 5 bits of every node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    HeapValue,
    Internal,
    Folder,
    SearchFolder,
    Message,
    Attachment,
    AssocMessage,
    HierarchyTable,
    ContentsTable,
    AssocContentsTable,
    RecipientTable,
    AttachmentTable,
    Other(u8),
}

impl NodeKind {
    pub fn of(id: NodeId) -> Self {
        match (id & NID_TYPE_MASK) as u8 {
            0 => NodeKind::HeapValue,
            1 => NodeKind::Internal,
            2 => NodeKind::Folder,
            3 => NodeKind::SearchFolder,
            4 => NodeKind::Message,
            5 => NodeKind::Attachment,
            8 => NodeKind::AssocMessage,
            13 => NodeKind::HierarchyTable,
            14 => NodeKind::ContentsTable,
            15 => NodeKind::AssocContentsTable,
            18 => NodeKind::RecipientTable,
            17 => NodeKind::AttachmentTable,
            tag => NodeKind::Other(tag),
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, NodeKind::Message)
    }
}
