pub mod mtcojo;
pub mod fast_fam;
