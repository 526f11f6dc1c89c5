use bytes::Bytes;

use crate::{error::ArchiveError, models::ExecutionRequest};

/// Fixed module manifest injected alongside every submission. The test
/// suite imports nothing outside the `solution` module, so the manifest
/// never varies per exercise.
pub const MANIFEST: &str = "module solution\n\ngo 1.25\n";

pub const MANIFEST_FILE: &str = "go.mod";
pub const SOLUTION_FILE: &str = "solution.go";
pub const TEST_FILE: &str = "solution_test.go";

const FILE_MODE: u32 = 0o644;

/// Frames the three-file payload as an uncompressed tar stream ready for
/// injection into the sandbox working directory. Entry order is fixed so
/// archives for identical requests are byte-identical.
pub fn build(request: &ExecutionRequest) -> Result<Bytes, ArchiveError> {
    let entries = [
        (MANIFEST_FILE, MANIFEST),
        (SOLUTION_FILE, request.code.as_str()),
        (TEST_FILE, request.test_source.as_str()),
    ];

    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(FILE_MODE);
        header.set_cksum();
        builder.append_data(&mut header, name, content.as_bytes())?;
    }

    Ok(Bytes::from(builder.into_inner()?))
}
