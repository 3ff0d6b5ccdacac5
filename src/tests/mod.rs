//! End-to-end scenario tests, mirroring the teacher's `src/tests/` layout:
//! each literal scenario gets its own test, built against the public
//! engine APIs rather than internals. Because every sealed-file date comes
//! from the filename (not the real file mtime), these scenarios need no
//! fake clock — an old filename is already "sealed" and "archivable" to
//! the engines regardless of wallclock time.
