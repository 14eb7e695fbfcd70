mod case_memory;
mod propagation;
mod schedule;
