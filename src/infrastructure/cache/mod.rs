mod local_mirror;

pub use local_mirror::LocalMirror;
