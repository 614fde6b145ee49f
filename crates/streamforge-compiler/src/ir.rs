//! The IR builder and buffer collaborator traits. Real codegen
//! backends (LLVM, cranelift, …) implement these; the segment
//! compiler in [`crate::segment`] is written against them and never
//! depends on a concrete backend.

/// Emits the generated code for one kernel's state machine:
/// `createBasicBlock`, `CreatePHI`, `CreateCall`, the atomic primitives,
/// and `CreateAssert`.
pub trait IrBuilder {
    /// An SSA value handle in the backend's own IR.
    type Value: Copy;
    /// A basic block handle in the backend's own IR.
    type Block: Copy;

    fn create_basic_block(&mut self, name: &str) -> Self::Block;
    fn set_insert_point(&mut self, block: Self::Block);

    fn create_phi(&mut self, name: &str, incoming: &[(Self::Value, Self::Block)]) -> Self::Value;
    fn create_call(&mut self, callee: &str, args: &[Self::Value]) -> Self::Value;

    fn const_u64(&mut self, value: u64) -> Self::Value;

    fn create_icmp_eq(&mut self, a: Self::Value, b: Self::Value) -> Self::Value;
    fn create_icmp_ult(&mut self, a: Self::Value, b: Self::Value) -> Self::Value;
    fn create_icmp_ule(&mut self, a: Self::Value, b: Self::Value) -> Self::Value;
    fn create_icmp_uge(&mut self, a: Self::Value, b: Self::Value) -> Self::Value;

    fn create_br(&mut self, target: Self::Block);
    fn create_cond_br(&mut self, cond: Self::Value, then_block: Self::Block, else_block: Self::Block);

    fn create_atomic_load_acquire(&mut self, addr: Self::Value) -> Self::Value;
    fn create_atomic_store_release(&mut self, addr: Self::Value, value: Self::Value);
    fn create_atomic_fetch_add(&mut self, addr: Self::Value, delta: Self::Value) -> Self::Value;

    /// Lowers to a call into the rethrow block when `cond` is false
    /// and assertions are enabled; a no-op otherwise.
    fn create_assert(&mut self, cond: Self::Value, message: &str);
}

/// A pipeline buffer, as seen by the generated code:
/// `linearlyAccessibleItems, linearlyWritableItems, reserveCapacity,
/// getBaseAddress, getRawItemPointer, setCapacity`. Unlike [`IrBuilder`]
/// this operates on concrete item counts and addresses — the segment
/// compiler emits *calls* into these operations, it does not need them
/// parameterized over a backend's IR value type.
pub trait Buffer {
    fn linearly_accessible_items(&self, processed: u64, available: u64, look_ahead: u64) -> u64;
    fn linearly_writable_items(&self, produced: u64, consumed: u64, copy_back_headroom: u64) -> u64;
    /// Doubles the allocation until `required` items fit; returns the
    /// (possibly unchanged) new capacity.
    fn reserve_capacity(&mut self, required: u64) -> u64;
    fn get_base_address(&self) -> usize;
    fn get_raw_item_pointer(&self, offset: u64) -> usize;
    fn set_capacity(&mut self, capacity: u64);
}

/// The per-kernel metadata collaborator: name, bindings, rates,
/// attributes, consumed but never mutated by the compiler.
pub trait KernelDescriptor {
    fn name(&self) -> &str;
    fn bindings(&self) -> &[streamforge_model::BindingId];
    fn internally_synchronized(&self) -> bool;
}
