//! Multi-step update descriptors (L5), used by the Ellen tree's help
//! protocol to make a two-CAS structural change (insert: link a new
//! internal node; delete: mark then prune) appear atomic to every thread.
//!
//! libcds pools these descriptors in a hand-rolled, version-tagged
//! free-list (`update_desc_pool`) to survive reuse without ABA, because the
//! reference SMR schemes it targets do not uniformly cover descriptor
//! objects the way they cover tree nodes. This crate makes descriptors
//! plain heap allocations retired through the same [`crate::smr::Reclaim`]
//! registry as tree nodes instead: a pointer is only ever reused once no
//! guard can still reference it, which is exactly the property the pooled,
//! versioned design exists to hand-roll. See DESIGN.md for this decision.

/// The four states an Ellen-tree internal node's `update` field cycles
/// through. Packed as the tag of a 2-bit [`crate::atomic::TaggedPtr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    /// No help is in progress at this node.
    Clean = 0,
    /// An insert is in progress; `update` points at an [`InsertInfo`].
    IFlag = 1,
    /// A delete is in progress; `update` points at a [`DeleteInfo`].
    DFlag = 2,
    /// This node has been logically removed as part of a delete and must
    /// not be revisited.
    Mark = 3,
}

impl From<UpdateState> for u8 {
    fn from(s: UpdateState) -> u8 {
        s as u8
    }
}

impl From<u8> for UpdateState {
    fn from(tag: u8) -> UpdateState {
        match tag & 0b11 {
            0 => UpdateState::Clean,
            1 => UpdateState::IFlag,
            2 => UpdateState::DFlag,
            _ => UpdateState::Mark,
        }
    }
}

/// The in-progress state of an insert: the parent being updated, the new
/// internal node about to replace the target leaf's slot, and the leaf
/// itself (kept so `help_insert` can recompute which child slot to CAS).
#[derive(Debug)]
pub struct InsertInfo<N> {
    /// The internal node whose child pointer is being swung.
    pub parent: *mut N,
    /// The freshly allocated internal node taking the leaf's place.
    pub new_internal: *mut N,
    /// The leaf the new internal node is replacing.
    pub leaf: *mut N,
    /// Whether `leaf` is `parent`'s right child (vs. left).
    pub right_leaf: bool,
}

/// The in-progress state of a delete: the grandparent and parent being
/// collapsed, and the sibling leaf that will take the parent's place.
#[derive(Debug)]
pub struct DeleteInfo<N> {
    /// The node two levels up, whose child pointer ultimately gets pruned
    /// to skip `parent` entirely.
    pub grandparent: *mut N,
    /// The internal node being removed along with the target leaf.
    pub parent: *mut N,
    /// The leaf being logically removed.
    pub leaf: *mut N,
    /// Whether `parent` is `grandparent`'s right child (vs. left); fixes
    /// which of `grandparent`'s two child pointers `help_marked` prunes.
    pub right_parent: bool,
    /// `parent`'s `update` field as observed when the delete began. Used
    /// both as the CAS `expected` value for the mark step and, if a racing
    /// operation already marked `parent` on our behalf, to recognize that
    /// and proceed to `help_marked` instead of retrying from scratch.
    pub parent_update_snapshot: crate::atomic::TaggedPtr<UpdateDescriptor<N>, 2>,
}

/// The payload an Ellen-tree `update` field points at while not `Clean`.
#[derive(Debug)]
pub enum Operation<N> {
    /// See [`InsertInfo`].
    Insert(InsertInfo<N>),
    /// See [`DeleteInfo`].
    Delete(DeleteInfo<N>),
}

/// A heap-allocated, retire-managed update descriptor.
#[derive(Debug)]
pub struct UpdateDescriptor<N> {
    /// Which multi-step operation this descriptor describes.
    pub op: Operation<N>,
}

impl<N> UpdateDescriptor<N> {
    /// Allocate a descriptor for an in-progress insert, returning a raw
    /// pointer suitable for packing into a [`crate::atomic::TaggedPtr`]
    /// alongside [`UpdateState::IFlag`].
    pub fn new_insert(info: InsertInfo<N>) -> *mut UpdateDescriptor<N> {
        Box::into_raw(Box::new(UpdateDescriptor { op: Operation::Insert(info) }))
    }

    /// Allocate a descriptor for an in-progress delete, returning a raw
    /// pointer suitable for packing alongside [`UpdateState::DFlag`].
    pub fn new_delete(info: DeleteInfo<N>) -> *mut UpdateDescriptor<N> {
        Box::into_raw(Box::new(UpdateDescriptor { op: Operation::Delete(info) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_a_two_bit_tag() {
        for s in [UpdateState::Clean, UpdateState::IFlag, UpdateState::DFlag, UpdateState::Mark] {
            let tag: u8 = s.into();
            assert_eq!(UpdateState::from(tag), s);
        }
    }

    #[test]
    fn insert_descriptor_round_trips_through_a_raw_pointer() {
        let mut leaf = 1i32;
        let mut parent = 2i32;
        let mut new_internal = 3i32;
        let raw = UpdateDescriptor::new_insert(InsertInfo {
            parent: &mut parent as *mut i32,
            new_internal: &mut new_internal as *mut i32,
            leaf: &mut leaf as *mut i32,
            right_leaf: false,
        });
        let desc = unsafe { Box::from_raw(raw) };
        match desc.op {
            Operation::Insert(info) => assert_eq!(info.leaf, &mut leaf as *mut i32),
            Operation::Delete(_) => panic!("expected an insert descriptor"),
        }
    }
}
