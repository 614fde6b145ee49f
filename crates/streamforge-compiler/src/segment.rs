//! Kernel segment compiler.
//!
//! Emits the nine-block state machine for one kernel invocation:
//! `kernel-entry → kernel-loop-entry → calculate-item-counts →
//! kernel-call → termination-check → {kernel-abnormal-termination,
//! kernel-terminated, loop-exit, loop-back} → kernel-loop-exit →
//! kernel-exit`. This module only emits control flow and calls through
//! [`IrBuilder`]; it never executes a kernel body itself (that's the
//! generated code's job at runtime).

use streamforge_model::BindingId;

use crate::ir::IrBuilder;

/// One port's static metadata as seen by the segment compiler — enough
/// to name the runtime helper calls it emits.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub binding: BindingId,
    pub name: String,
    pub zero_extended: bool,
}

/// Static description of one kernel invocation the compiler lowers into
/// a segment state machine.
#[derive(Debug, Clone)]
pub struct KernelSegmentDescriptor {
    pub kernel_name: String,
    pub inputs: Vec<PortDescriptor>,
    pub outputs: Vec<PortDescriptor>,
    pub internally_synchronized: bool,
}

/// The basic block handles for one compiled segment, in case a caller
/// (e.g. a driver stitching segments into a loop) needs to branch
/// into or out of them.
pub struct KernelSegmentBlocks<B: IrBuilder> {
    pub entry: B::Block,
    pub loop_entry: B::Block,
    pub calculate_item_counts: B::Block,
    pub call: B::Block,
    pub termination_check: B::Block,
    pub abnormal_termination: B::Block,
    pub terminated: B::Block,
    pub loop_exit: B::Block,
    pub exit: B::Block,
}

/// Emits the nine named blocks and wires them into the state machine
/// above. Returns the block handles so the caller can branch into
/// `entry` to invoke this kernel for the current segment.
pub fn compile_kernel_segment<B: IrBuilder>(
    builder: &mut B,
    desc: &KernelSegmentDescriptor,
) -> KernelSegmentBlocks<B> {
    let prefix = &desc.kernel_name;
    let entry = builder.create_basic_block(&format!("{prefix}.kernel-entry"));
    let loop_entry = builder.create_basic_block(&format!("{prefix}.kernel-loop-entry"));
    let calculate_item_counts = builder.create_basic_block(&format!("{prefix}.calculate-item-counts"));
    let call = builder.create_basic_block(&format!("{prefix}.kernel-call"));
    let termination_check = builder.create_basic_block(&format!("{prefix}.termination-check"));
    let abnormal_termination = builder.create_basic_block(&format!("{prefix}.kernel-abnormal-termination"));
    let terminated = builder.create_basic_block(&format!("{prefix}.kernel-terminated"));
    let loop_exit = builder.create_basic_block(&format!("{prefix}.kernel-loop-exit"));
    let exit = builder.create_basic_block(&format!("{prefix}.kernel-exit"));

    // kernel-entry: load initial counts, skip straight to exit if this
    // kernel already terminated in an earlier segment.
    builder.set_insert_point(entry);
    let already_terminated = builder.create_call(&format!("{prefix}.load_terminated"), &[]);
    let zero = builder.const_u64(0);
    let was_terminated = builder.create_icmp_eq(already_terminated, zero);
    builder.create_cond_br(was_terminated, loop_entry, exit);

    // kernel-loop-entry: PHI the five loop-carried values, then compute
    // per-port accessible/writable items and the bounding stride count.
    builder.set_insert_point(loop_entry);
    let initial_processed = builder.create_call(&format!("{prefix}.load_processed"), &[]);
    let initial_produced = builder.create_call(&format!("{prefix}.load_produced"), &[]);
    let initial_progress = builder.const_u64(0);
    let initial_executed = builder.const_u64(0);
    let initial_stride_count = builder.const_u64(0);

    let processed_phi = builder.create_phi(
        &format!("{prefix}.processed"),
        &[(initial_processed, entry), (initial_processed, termination_check)],
    );
    let produced_phi = builder.create_phi(
        &format!("{prefix}.produced"),
        &[(initial_produced, entry), (initial_produced, termination_check)],
    );
    let progress_phi = builder.create_phi(
        &format!("{prefix}.progress"),
        &[(initial_progress, entry), (initial_progress, termination_check)],
    );
    let executed_phi = builder.create_phi(
        &format!("{prefix}.executed_at_least_once"),
        &[(initial_executed, entry), (initial_executed, termination_check)],
    );
    let stride_count_phi = builder.create_phi(
        &format!("{prefix}.stride_count"),
        &[(initial_stride_count, entry), (initial_stride_count, termination_check)],
    );

    for input in &desc.inputs {
        builder.create_call(
            &format!("{prefix}.accessible_items.{}", input.name),
            &[processed_phi],
        );
    }
    for output in &desc.outputs {
        builder.create_call(
            &format!("{prefix}.writable_items.{}", output.name),
            &[produced_phi],
        );
    }
    let num_linear_strides = builder.create_call(&format!("{prefix}.num_linear_strides"), &[stride_count_phi]);
    builder.create_br(calculate_item_counts);

    // calculate-item-counts: final counts if this stride closes the
    // kernel, linear counts otherwise. The two branches share the same
    // named block; which arithmetic runs is a runtime decision the
    // generated code makes, not a compile-time branch, so both calls
    // are emitted and the backend selects between them.
    builder.set_insert_point(calculate_item_counts);
    let any_input_closed = builder.create_call(&format!("{prefix}.any_input_closed"), &[]);
    builder.create_call(&format!("{prefix}.calculate_item_counts"), &[num_linear_strides, any_input_closed]);
    builder.create_br(call);

    // kernel-call: zero-extend closed inputs, compute epoch pointers,
    // invoke doSegment.
    builder.set_insert_point(call);
    for input in desc.inputs.iter().filter(|p| p.zero_extended) {
        builder.create_call(&format!("{prefix}.zero_extend.{}", input.name), &[processed_phi]);
    }
    let seg_no = if desc.internally_synchronized {
        builder.create_call(&format!("{prefix}.external_seg_no"), &[])
    } else {
        builder.const_u64(0)
    };
    let term_signal = builder.create_call(&format!("{prefix}.doSegment"), &[processed_phi, produced_phi, seg_no]);
    builder.create_br(termination_check);

    // termination-check: explicit signal -> abnormal; final stride ->
    // terminated; bound reached -> exit loop; else loop back.
    builder.set_insert_point(termination_check);
    let none_signal = builder.const_u64(0);
    let signaled = builder.create_icmp_eq(term_signal, none_signal);
    // `signaled` is true when the signal equals "None" — invert the
    // sense by swapping branch targets rather than emitting a NOT.
    let post_signal_check = builder.create_basic_block(&format!("{prefix}.termination-check.final-stride"));
    builder.create_cond_br(signaled, post_signal_check, abnormal_termination);

    builder.set_insert_point(post_signal_check);
    let is_final_stride = builder.create_call(&format!("{prefix}.is_final_stride"), &[num_linear_strides]);
    let final_zero = builder.const_u64(0);
    let final_flag = builder.create_icmp_eq(is_final_stride, final_zero);
    let post_final_check = builder.create_basic_block(&format!("{prefix}.termination-check.bound-reached"));
    builder.create_cond_br(final_flag, post_final_check, terminated);

    builder.set_insert_point(post_final_check);
    let partition_upper_bound = builder.create_call(&format!("{prefix}.partition_upper_bound"), &[]);
    let bound_reached = builder.create_icmp_uge(num_linear_strides, partition_upper_bound);
    builder.create_cond_br(bound_reached, loop_exit, loop_entry);

    // kernel-abnormal-termination: feeds into kernel-loop-exit per the
    // diagram's right-hand rail.
    builder.set_insert_point(abnormal_termination);
    builder.create_call(&format!("{prefix}.record_abnormal_termination"), &[term_signal]);
    builder.create_br(loop_exit);

    // kernel-terminated: zero-fill the unwritten output region, publish
    // final counts, set the termination scalar.
    builder.set_insert_point(terminated);
    builder.create_call(&format!("{prefix}.zero_fill_unwritten_output"), &[]);
    builder.create_call(&format!("{prefix}.publish_final_item_counts"), &[]);
    builder.create_call(&format!("{prefix}.set_terminated"), &[term_signal]);
    builder.create_br(loop_exit);

    // kernel-loop-exit: publish counts atomically, copy-back, look-ahead
    // write-back, compute fully-produced count.
    builder.set_insert_point(loop_exit);
    builder.create_atomic_store_release(processed_phi, produced_phi);
    for output in &desc.outputs {
        builder.create_call(&format!("{prefix}.copy_back.{}", output.name), &[]);
        builder.create_call(&format!("{prefix}.look_ahead_write_back.{}", output.name), &[]);
    }
    builder.create_call(&format!("{prefix}.compute_fully_produced"), &[produced_phi]);
    builder.create_br(exit);

    // kernel-exit: PHI the termination signal, update progress flag.
    builder.set_insert_point(exit);
    let entry_term_signal = builder.create_call(&format!("{prefix}.load_terminated"), &[]);
    builder.create_phi(
        &format!("{prefix}.final_termination_signal"),
        &[(entry_term_signal, entry), (term_signal, loop_exit)],
    );
    builder.create_call(&format!("{prefix}.update_progress_flag"), &[progress_phi, executed_phi]);

    KernelSegmentBlocks {
        entry,
        loop_entry,
        calculate_item_counts,
        call,
        termination_check,
        abnormal_termination,
        terminated,
        loop_exit,
        exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records every emitted instruction so tests can assert on the
    /// control-flow shape without a real codegen backend.
    #[derive(Default)]
    struct RecordingBuilder {
        blocks: RefCell<Vec<String>>,
        calls: RefCell<Vec<String>>,
        branches: RefCell<Vec<(usize, usize)>>,
        cond_branches: RefCell<Vec<(usize, usize)>>,
        current: RefCell<usize>,
        next_value: RefCell<u64>,
    }

    impl IrBuilder for RecordingBuilder {
        type Value = u64;
        type Block = usize;

        fn create_basic_block(&mut self, name: &str) -> usize {
            self.blocks.borrow_mut().push(name.to_string());
            self.blocks.borrow().len() - 1
        }
        fn set_insert_point(&mut self, block: usize) {
            *self.current.borrow_mut() = block;
        }
        fn create_phi(&mut self, _name: &str, _incoming: &[(u64, usize)]) -> u64 {
            self.fresh_value()
        }
        fn create_call(&mut self, callee: &str, _args: &[u64]) -> u64 {
            self.calls.borrow_mut().push(callee.to_string());
            self.fresh_value()
        }
        fn const_u64(&mut self, value: u64) -> u64 {
            value
        }
        fn create_icmp_eq(&mut self, _a: u64, _b: u64) -> u64 {
            self.fresh_value()
        }
        fn create_icmp_ult(&mut self, _a: u64, _b: u64) -> u64 {
            self.fresh_value()
        }
        fn create_icmp_ule(&mut self, _a: u64, _b: u64) -> u64 {
            self.fresh_value()
        }
        fn create_icmp_uge(&mut self, _a: u64, _b: u64) -> u64 {
            self.fresh_value()
        }
        fn create_br(&mut self, target: usize) {
            self.branches.borrow_mut().push((*self.current.borrow(), target));
        }
        fn create_cond_br(&mut self, _cond: u64, then_block: usize, else_block: usize) {
            let from = *self.current.borrow();
            self.cond_branches.borrow_mut().push((from, then_block));
            self.cond_branches.borrow_mut().push((from, else_block));
        }
        fn create_atomic_load_acquire(&mut self, _addr: u64) -> u64 {
            self.fresh_value()
        }
        fn create_atomic_store_release(&mut self, _addr: u64, _value: u64) {}
        fn create_atomic_fetch_add(&mut self, _addr: u64, _delta: u64) -> u64 {
            self.fresh_value()
        }
        fn create_assert(&mut self, _cond: u64, _message: &str) {}
    }

    impl RecordingBuilder {
        fn fresh_value(&self) -> u64 {
            let mut v = self.next_value.borrow_mut();
            *v += 1;
            *v
        }
    }

    fn desc() -> KernelSegmentDescriptor {
        KernelSegmentDescriptor {
            kernel_name: "k".to_string(),
            inputs: vec![PortDescriptor { binding: BindingId(0), name: "in".to_string(), zero_extended: false }],
            outputs: vec![PortDescriptor { binding: BindingId(1), name: "out".to_string(), zero_extended: false }],
            internally_synchronized: false,
        }
    }

    #[test]
    fn emits_all_nine_named_blocks() {
        let mut builder = RecordingBuilder::default();
        let blocks = compile_kernel_segment(&mut builder, &desc());
        let names = builder.blocks.borrow();
        for tag in [
            "kernel-entry",
            "kernel-loop-entry",
            "calculate-item-counts",
            "kernel-call",
            "termination-check",
            "kernel-abnormal-termination",
            "kernel-terminated",
            "kernel-loop-exit",
            "kernel-exit",
        ] {
            assert!(names.iter().any(|n| n.contains(tag)), "missing block for {tag}");
        }
        assert_ne!(blocks.entry, blocks.exit);
    }

    #[test]
    fn abnormal_and_terminated_both_feed_loop_exit() {
        let mut builder = RecordingBuilder::default();
        let blocks = compile_kernel_segment(&mut builder, &desc());
        let branches = builder.branches.borrow();
        assert!(branches.contains(&(blocks.abnormal_termination, blocks.loop_exit)));
        assert!(branches.contains(&(blocks.terminated, blocks.loop_exit)));
        assert!(branches.contains(&(blocks.loop_exit, blocks.exit)));
    }

    #[test]
    fn doSegment_is_called_exactly_once() {
        let mut builder = RecordingBuilder::default();
        compile_kernel_segment(&mut builder, &desc());
        let calls = builder.calls.borrow();
        assert_eq!(calls.iter().filter(|c| c.ends_with(".doSegment")).count(), 1);
    }
}
