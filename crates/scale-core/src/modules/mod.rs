pub mod binning;
pub mod context;
pub mod filtering;
pub mod grouping;
pub mod ih;
pub mod outliers;
pub mod parameterization;
pub mod pipeline;
pub mod quality;
pub mod refinement;
pub mod selection;
pub mod symmetry;
pub mod table;
pub mod weighting;
