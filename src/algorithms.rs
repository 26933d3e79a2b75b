pub mod coarsening;
pub mod initialization;
pub mod moments;
pub mod refinement;
