//! Installation before `main`, behind the `auto-install` feature.

#[ctor::ctor]
fn install_at_startup()
{
    let _ = crate::install::install();
}
