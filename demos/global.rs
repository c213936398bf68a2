use std::collections::HashMap;

use slabloc::Slabloc;

#[global_allocator]
static ALLOCATOR: Slabloc = Slabloc::new();

fn report<T>(label: &str, address: *const T) {
    let usable = unsafe { ALLOCATOR.usable_size(address.cast()) };
    println!("{label:<24} at {address:?}, {usable} usable bytes");
}

fn main() {
    let boxed = Box::new(42u64);
    report("Box<u64>", &*boxed);

    let mut words = Vec::new();
    for word in "every piece of memory here comes from mmap".split(' ') {
        words.push(word.to_uppercase());
    }
    report("Vec<String>", words.as_ptr());
    report("first String", words[0].as_ptr());

    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in words.concat().chars() {
        *counts.entry(c).or_default() += 1;
    }
    println!("{} distinct letters", counts.len());

    let handle = std::thread::spawn(|| {
        let squares: Vec<u32> = (0..100).map(|n| n * n).collect();
        report("squares (other thread)", squares.as_ptr());
        squares.iter().sum::<u32>()
    });
    println!("Sum of squares: {}", handle.join().unwrap());

    // Goes through the large object path and is page aligned.
    let buffer = vec![0u8; 64 * 1024];
    report("64K buffer", buffer.as_ptr());
}
