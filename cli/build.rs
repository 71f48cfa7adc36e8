/// Make cargo rebuild when service templates change.
///
/// `include_dir!()` does not track the files it embeds, so without this an
/// edited template would keep shipping its old contents.
fn main() {
    println!("cargo::rerun-if-changed=templates");
}
