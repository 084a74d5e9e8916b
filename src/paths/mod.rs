//! Sample-path enumeration, random draws and Markov-state matching.

pub mod enumerate;
pub mod matcher;
pub mod sample;

pub use enumerate::{
    SamplePath, SamplePathIter, count_sample_paths, enumerate_sample_paths, sample_paths,
};
pub use matcher::{match_markov_states, match_trajectory, nearest_state, squared_distance};
pub use sample::{MarkovianSample, draw_markovian_paths, draw_sample_path, draw_trajectories};
