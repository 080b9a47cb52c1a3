#[macro_use]
extern crate afl;
use cachet::Envelope;

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = serde_json::from_slice::<Envelope>(data);
    });
}
