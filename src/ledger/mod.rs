pub mod cascade;

pub use cascade::{
    cascade_from, margin_sum, recompute, swap_slots, CascadeSink, Derived, SlotRef,
};
