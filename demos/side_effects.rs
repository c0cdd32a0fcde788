use std::cell::Cell;
use std::rc::Rc;

//
// Demonstrates the reason this adaptor exists: a producer whose evaluation
// has an observable side effect. Every reader below revisits the same
// elements, yet the counter lands exactly on the element count.
//
fn main() -> anyhow::Result<()> {
    let evaluations = Rc::new(Cell::new(0u32));
    let probe = Rc::clone(&evaluations);

    let cursor = rewind::cached((0..10_000u32).map(move |i| {
        probe.set(probe.get() + 1);
        i * i
    }));

    // a second and third reader over the same stream
    let squares = cursor.save();
    let mut windows = cursor.save();

    let sum: u64 = cursor.map(u64::from).sum();
    println!("sum of squares: {sum}");

    let biggest = squares.max().unwrap_or(0);
    println!("largest square: {biggest}");

    let mut ascending_pairs = 0u32;
    while windows.get(1).is_ok() {
        if windows.get(0)? < windows.get(1)? {
            ascending_pairs += 1;
        }
        windows.pop_front()?;
    }
    println!("ascending adjacent pairs: {ascending_pairs}");

    println!(
        "producer evaluations: {} (for three full traversals)",
        evaluations.get()
    );
    Ok(())
}
