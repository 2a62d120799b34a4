use super::{Element, ElementKind, Error, WeavingContext};

/// Rewrites the code around the program elements it is attached to
///
/// A marker lists the element kinds it handles and gets called once per element. It obtains
/// writers for whichever bodies it needs through the context, and must leave every body it edits
/// stack-balanced: nothing checks that for it.
///
/// If `weave` fails, every body the marker touched for this member is rolled back by the driver.
pub trait Marker<'g> {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Element kinds this marker can be attached to
    fn applies_to(&self) -> &[ElementKind];

    fn weave(&self, element: &Element<'g>, cx: &mut WeavingContext<'g>) -> Result<(), Error>;

    fn can_weave(&self, kind: ElementKind) -> bool {
        self.applies_to().contains(&kind)
    }
}
