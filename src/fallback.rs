//! Canned structured replies used when the inference backend is unavailable.
//!
//! Every entry carries a list of case-insensitive patterns. A message is
//! scored against each entry by how many of its patterns match the
//! lower-cased, trimmed text; the highest count wins and ties go to the
//! entry declared first. A message that matches nothing gets
//! [`default_entry`]. Nothing here touches the network.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Intent;
use crate::workflow::ActionTemplate;

/// One canned reply with its match rules.
#[derive(Debug)]
pub struct FallbackEntry {
    pub topic: &'static str,
    pub patterns: Vec<Regex>,
    pub reply: &'static str,
    pub intent: Intent,
    pub questions: &'static [&'static str],
    pub actions: &'static [ActionTemplate],
}

impl FallbackEntry {
    /// Number of patterns that match `text`.
    pub fn score(&self, text: &str) -> usize {
        self.patterns.iter().filter(|p| p.is_match(text)).count()
    }

    pub fn is_default(&self) -> bool {
        self.topic == DEFAULT_RULE.topic
    }
}

struct Rule {
    topic: &'static str,
    patterns: &'static [&'static str],
    reply: &'static str,
    intent: Intent,
    questions: &'static [&'static str],
    actions: &'static [ActionTemplate],
}

impl Rule {
    fn compile(&self) -> FallbackEntry {
        FallbackEntry {
            topic: self.topic,
            patterns: self
                .patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){}", p)).expect("fallback pattern is valid"))
                .collect(),
            reply: self.reply,
            intent: self.intent,
            questions: self.questions,
            actions: self.actions,
        }
    }
}

const RULES: &[Rule] = &[
    Rule {
        topic: "greeting",
        patterns: &[r"^(hi|hello|hey|sup|yo|what'?s up|greetings|good (morning|afternoon|evening))"],
        reply: "Hey there! I'm Ava, the U Choose We Print assistant. I can help with DTF printing, custom apparel, gang sheets, file prep, pricing and shipping. What are you working on today?",
        intent: Intent::Greeting,
        questions: &[
            "What products do you offer?",
            "How does DTF printing work?",
            "How do I place an order?",
        ],
        actions: &[
            ActionTemplate::link("Browse Shop", "/shop"),
            ActionTemplate::link("Build a Gang Sheet", "/builder"),
        ],
    },
    Rule {
        topic: "products",
        patterns: &[
            r"what (do you|products?|items?).*(sell|offer|have|carry|make)",
            r"product(s| catalog| list)?",
            r"what can (i|you) (get|order|buy|print)",
            r"show me.*(products?|catalog|shop)",
            r"browse|shop|store",
        ],
        reply: "Here's what we print:\n\n**DTF Transfers**: custom gang sheets on 22\" wide film, ready to heat press.\n\n**Custom Apparel**: tees, hoodies and tanks from Gildan, Next Level, Bella+Canvas and Comfort Colors in dozens of colors and sizes.\n\n**Sublimation Prints**: mugs, tumblers and polyester items.\n\n**Home Decor**: canvas prints and wall art.\n\n**Promotional Products**: custom items for businesses and events.\n\nEverything can carry your own design.",
        intent: Intent::General,
        questions: &[
            "Tell me more about DTF transfers",
            "What apparel brands do you carry?",
            "How does gang sheet pricing work?",
        ],
        actions: &[
            ActionTemplate::link("Browse All Products", "/shop"),
            ActionTemplate::link("Custom Apparel", "/category/apparel"),
            ActionTemplate::link("DTF Transfers", "/category/dtf-transfers"),
        ],
    },
    Rule {
        topic: "pricing",
        patterns: &[
            r"pric|cost|how much|rate|fee|cheap|expensive|afford|budget",
            r"what (does|do|will).*(cost|charge|price)",
            r"quote|estimate",
        ],
        reply: "Pricing depends on the product:\n\n**Gang Sheets** are priced by sheet size, not per design. Sheets are 22\" wide and 12\" to 48\"+ long, starting around $8/ft.\n\n**Custom Apparel** varies by brand, style and size. Tees start around $8-15 each.\n\n**Rush Processing** is an extra $15 to jump the production queue.\n\n**Business accounts** unlock wholesale pricing on everything once approved.\n\nThe shop always shows current prices for each item.",
        intent: Intent::Pricing,
        questions: &[
            "What gang sheet sizes are available?",
            "How do I get wholesale pricing?",
            "Is rush processing worth it?",
        ],
        actions: &[
            ActionTemplate::link("View Pricing", "/shop"),
            ActionTemplate::link("Gang Sheet Builder", "/builder"),
        ],
    },
    Rule {
        topic: "wholesale",
        patterns: &[
            r"wholesale|business (account|pricing|customer)|bulk (order|discount|pricing)",
            r"resell|resale|b2b|distributor",
        ],
        reply: "Approved business accounts get wholesale pricing:\n\n1. **Create an account** and choose 'Business' as the customer type\n2. **Apply for approval**, reviewed within 1-2 business days\n3. **Once approved**, wholesale prices show on every product\n4. **Wholesale mode** compares your price against retail on the product page\n\nBusiness accounts typically save 20-30% over retail.",
        intent: Intent::Pricing,
        questions: &[
            "How do I create a business account?",
            "What are the wholesale prices?",
            "Is there a minimum order for wholesale?",
        ],
        actions: &[
            ActionTemplate::link("Create Account", "/register"),
            ActionTemplate::link("Browse Products", "/shop"),
        ],
    },
    Rule {
        topic: "gang sheets",
        patterns: &[
            r"gang\s*sheet",
            r"sheet (builder|size|dimension)",
            r"arrange.*(design|image)",
            r"builder|canvas",
        ],
        reply: "A gang sheet is one 22\"-wide print where you arrange as many designs as fit. You pay for the sheet size, not per design.\n\n**Sizes:**\n- Small: 22\" x 12\"\n- Medium: 22\" x 24\"\n- Large: 22\" x 36\"\n- XL: 22\" x 48\"\n\n**How:** open the Gang Sheet Builder, upload PNG designs, drag them onto the canvas, arrange and resize, then check out. Transfers arrive pre-cut and ready to press.\n\n**Tip:** rotate designs to fill every gap.",
        intent: Intent::GangSheet,
        questions: &[
            "What file format should I use?",
            "How do I use the gang sheet builder?",
            "What is the spacing between designs?",
        ],
        actions: &[
            ActionTemplate::link("Open Builder", "/builder"),
            ActionTemplate::link("View Gang Sheet Product", "/product/custom-dtf-gang-sheet"),
        ],
    },
    Rule {
        topic: "dtf",
        patterns: &[
            r"dtf|direct.to.film",
            r"how (does|do).*(print|transfer|work)",
            r"what is (dtf|direct)",
            r"heat.?press|transfer (paper|sheet|film)",
        ],
        reply: "DTF (Direct-to-Film) is our specialty:\n\n1. **Your design is printed** onto PET film with CMYK + white inks\n2. **Adhesive powder** is applied and cured\n3. **You heat press** the transfer at 300-325°F for 10-15 seconds\n\nDTF works on cotton, polyester, blends, nylon, denim and leather, on any garment color. Prints last 50+ washes, need no weeding and have no minimum order.",
        intent: Intent::DtfInfo,
        questions: &[
            "DTF vs sublimation, which is better?",
            "What temperature for heat pressing?",
            "How long do DTF transfers last?",
        ],
        actions: &[
            ActionTemplate::link("Browse DTF Transfers", "/category/dtf-transfers"),
            ActionTemplate::link("Start a Gang Sheet", "/builder"),
        ],
    },
    Rule {
        topic: "dtf vs sublimation",
        patterns: &[
            r"sublimation",
            r"dtf vs|vs dtf|compare|difference between",
            r"which.*better|better.*which",
        ],
        reply: "**DTF** works on any fabric and any color, sits as a thin flexible film and lasts 50+ washes. Best for cotton, dark garments and mixed orders.\n\n**Sublimation** only works on white or light polyester but becomes part of the fabric. Best for white polyester, all-over prints and mugs.\n\nPrinting on cotton or dark garments? Go with DTF. We offer both.",
        intent: Intent::DtfInfo,
        questions: &[
            "What fabrics work with DTF?",
            "Do you offer sublimation printing?",
            "What about screen printing?",
        ],
        actions: &[
            ActionTemplate::link("DTF Transfers", "/category/dtf-transfers"),
            ActionTemplate::link("Sublimation Products", "/category/sublimation-prints"),
        ],
    },
    Rule {
        topic: "file prep",
        patterns: &[
            r"file|image|png|dpi|resolution|upload|format|prepare|prep",
            r"transparent|background|quality",
            r"photoshop|gimp|canva|design software",
        ],
        reply: "For the best DTF prints:\n\n**Format:** PNG with a transparent background\n**Resolution:** 300 DPI at print size (150 DPI minimum)\n**Color mode:** RGB, we handle the conversion\n**Max size:** 15 MB per image\n\nWhite backgrounds print as white rectangles, so remove them first. Keep text at 8pt or larger and lines at 1pt or thicker. No mirroring or bleed needed.\n\nA 10\" x 10\" print needs at least 3000 x 3000 px.",
        intent: Intent::FilePrep,
        questions: &[
            "Can I upload JPEG files?",
            "How do I remove a white background?",
            "Can you check my image quality?",
        ],
        actions: &[
            ActionTemplate::action("Check My Image"),
            ActionTemplate::link("Start Uploading", "/builder"),
        ],
    },
    Rule {
        topic: "turnaround",
        patterns: &[
            r"turnaround|shipping|delivery|how long|when.*arriv|time|days|rush|fast|quick|track",
            r"how (soon|fast|quickly)",
            r"ship|deliver|mail|usps|fedex",
        ],
        reply: "**Production:**\n- Standard: 2-3 business days\n- Rush: 1 business day (+$15)\n- Orders placed before 12 PM EST start the same day\n\n**Shipping:**\n- USPS Ground Advantage: 3-5 business days\n- USPS Priority Mail: 2-3 business days\n- USPS Priority Express: 1-2 business days\n\nStandard production plus Priority Mail is about 6 business days. You'll get a tracking number by email once your order ships.",
        intent: Intent::Turnaround,
        questions: &[
            "How do I track my order?",
            "Is rush processing worth it?",
            "What about holiday shipping times?",
        ],
        actions: &[
            ActionTemplate::link("Track Order", "/track"),
            ActionTemplate::link("My Orders", "/account/orders"),
        ],
    },
    Rule {
        topic: "order status",
        patterns: &[
            r"order (status|number|track|where)|track.*order|where.*(my|order|package)",
            r"shipped|delivered|package",
            r"my order",
        ],
        reply: "You can check an order three ways:\n\n1. **My Orders**: log in and open Account → My Orders\n2. **Email**: tracking numbers go out as soon as an order ships\n3. **Track page**: enter your order number\n\nStatuses go Pending → Processing → Printed → Shipped → Delivered. Tracking can take up to 24 hours to update after the label is created.",
        intent: Intent::OrderStatus,
        questions: &[
            "When will my order ship?",
            "I need to change my order",
            "What if my order is wrong?",
        ],
        actions: &[
            ActionTemplate::link("My Orders", "/account/orders"),
            ActionTemplate::link("Track Shipment", "/track"),
            ActionTemplate::email("Contact Support"),
        ],
    },
    Rule {
        topic: "refund",
        patterns: &[r"refund|return|cancel|wrong|defect|damage|money back|complaint|exchange"],
        reply: "We stand behind our prints.\n\n**Eligible for a refund or reprint:** print defects, damage in transit, or the wrong order.\n\n**Not eligible:** design errors such as low-resolution images, transfers already pressed, or a change of mind after production started.\n\n**To request:** contact support within 7 days with your order number and photos. We review within 1-2 business days and you choose a reprint or refund.\n\nOrders can be cancelled within 1 hour if production hasn't started.",
        intent: Intent::Refund,
        questions: &[
            "How long does a refund take?",
            "Can I cancel my order?",
            "My transfer has a defect",
        ],
        actions: &[
            ActionTemplate::email("Contact Support"),
            ActionTemplate::link("My Orders", "/account/orders"),
        ],
    },
    Rule {
        topic: "apparel",
        patterns: &[
            r"t-?shirt|hoodie|sweatshirt|tank top|apparel|clothing|garment|jersey",
            r"gildan|next level|bella.?canvas|comfort colors|champion",
            r"custom (shirt|hoodie|apparel|clothing)",
            r"brand|color|size",
        ],
        reply: "We carry premium blanks for custom printing:\n\n- **Gildan**: classic tees, hoodies and crews\n- **Next Level**: soft retail-fit tees and tanks\n- **Bella+Canvas**: premium fashion blanks\n- **Comfort Colors**: vintage-washed heavyweights\n- **Champion**: athletic hoodies and crews\n\nStyles include tees, long sleeves, hoodies, crewnecks, tanks and polos in youth through 5XL.",
        intent: Intent::General,
        questions: &[
            "What are your most popular shirts?",
            "Do you carry plus sizes?",
            "Can I customize the design placement?",
        ],
        actions: &[
            ActionTemplate::link("Browse Apparel", "/category/apparel"),
            ActionTemplate::link("Customize a Product", "/shop"),
        ],
    },
    Rule {
        topic: "customization",
        patterns: &[
            r"customiz|design (tool|editor|placement)|mockup|preview|personali",
            r"add (text|logo|image)|place.*(design|logo)",
        ],
        reply: "Every product has a built-in customizer: add images, logos and text, position and resize them, and preview a mockup before ordering.\n\nThe Gang Sheet Builder takes multiple uploads at once on a 22\" canvas with live pricing by sheet size.\n\nOpen any product and click 'Customize This Product' to start.",
        intent: Intent::General,
        questions: &[
            "Can I see a preview before ordering?",
            "What file formats do you accept?",
            "Can I add text to my design?",
        ],
        actions: &[
            ActionTemplate::link("Browse Products", "/shop"),
            ActionTemplate::link("Gang Sheet Builder", "/builder"),
        ],
    },
    Rule {
        topic: "account",
        patterns: &[
            r"account|login|sign (up|in)|register|password|profile",
            r"create.*account|make.*account",
        ],
        reply: "A free account lets you track orders, save designs, reuse addresses and check out faster. Business accounts also get wholesale pricing after approval.\n\nAlready have one? Log in to see your order history and reorder.",
        intent: Intent::General,
        questions: &[
            "How do I create a business account?",
            "I forgot my password",
            "How do I track my order?",
        ],
        actions: &[
            ActionTemplate::link("Login", "/login"),
            ActionTemplate::link("Create Account", "/register"),
            ActionTemplate::link("My Account", "/account"),
        ],
    },
    Rule {
        topic: "contact",
        patterns: &[
            r"contact|support|help|email|phone|reach|talk to (human|person|someone|agent)",
            r"customer service",
        ],
        reply: "Happy to help. To reach the team directly, email support@uchooseweprint.com; we respond within 24 business hours.\n\nI can answer questions about products, file preparation, pricing, sizing, ordering and DTF printing right now. For order-specific issues, include your order number in the email.",
        intent: Intent::General,
        questions: &[
            "How do I prepare my files?",
            "What are your prices?",
            "How long does shipping take?",
        ],
        actions: &[
            ActionTemplate::email("Email Support"),
            ActionTemplate::link("Browse Products", "/shop"),
        ],
    },
    Rule {
        topic: "how to order",
        patterns: &[
            r"how (do i|to|can i).*(order|buy|purchase|checkout|place)",
            r"ordering process|checkout|payment",
            r"step.?by.?step|walk.*through",
        ],
        reply: "**Gang sheets:** open the builder, choose a sheet size, upload 300 DPI transparent PNGs, arrange them, then add to cart.\n\n**Custom apparel:** pick a product, brand, color and size, click 'Customize This Product', add your design, then choose quantity and turnaround.\n\nWe accept all major credit cards through secure checkout. Shipping is calculated at checkout.",
        intent: Intent::General,
        questions: &[
            "What payment methods do you accept?",
            "Is there a minimum order?",
            "How do I upload my design?",
        ],
        actions: &[
            ActionTemplate::link("Start Shopping", "/shop"),
            ActionTemplate::link("Gang Sheet Builder", "/builder"),
        ],
    },
    Rule {
        topic: "heat press",
        patterns: &[
            r"heat press|pressing|apply|application|temperature|temp|how to press",
            r"wash|care|laundry|durable|durability|last",
        ],
        reply: "**Pressing DTF transfers:**\n- Temperature: 300-325°F (150-165°C)\n- Pressure: medium-firm\n- Time: 10-15 seconds\n- Peel: warm, about 5 seconds after pressing\n- Optional: re-press 5 seconds after peeling\n\n**Care:** wait 24 hours before the first wash, wash inside-out in cold water, tumble dry low, and never iron directly over the print. Pressed correctly, transfers last 50+ washes.",
        intent: Intent::DtfInfo,
        questions: &[
            "What heat press do you recommend?",
            "Can I iron DTF transfers?",
            "How long do the prints last?",
        ],
        actions: &[ActionTemplate::link("Order Transfers", "/category/dtf-transfers")],
    },
];

const DEFAULT_RULE: Rule = Rule {
    topic: "default",
    patterns: &[],
    reply: "Good question! Here's what I can help with:\n\n- **Products & Pricing**: DTF transfers, custom apparel, gang sheets\n- **File Preparation**: format, resolution and transparency\n- **Order Help**: tracking, turnaround and shipping\n- **DTF Info**: how it works and how it compares to sublimation\n- **Returns**: our refund and reprint policy\n\nAsk about any of these, or browse the shop to get started.",
    intent: Intent::General,
    questions: &[
        "What products do you offer?",
        "How does DTF printing work?",
        "What are your prices?",
        "How long does shipping take?",
    ],
    actions: &[
        ActionTemplate::link("Browse Shop", "/shop"),
        ActionTemplate::link("Gang Sheet Builder", "/builder"),
        ActionTemplate::email("Contact Support"),
    ],
};

static ENTRIES: LazyLock<Vec<FallbackEntry>> =
    LazyLock::new(|| RULES.iter().map(Rule::compile).collect());

static DEFAULT_ENTRY: LazyLock<FallbackEntry> = LazyLock::new(|| DEFAULT_RULE.compile());

/// All pattern-bearing entries in declaration order.
pub fn entries() -> &'static [FallbackEntry] {
    &ENTRIES
}

/// The reply used when no entry matches.
pub fn default_entry() -> &'static FallbackEntry {
    &DEFAULT_ENTRY
}

/// Pick the entry with the most matching patterns for `message`.
pub fn best_match(message: &str) -> &'static FallbackEntry {
    let text = message.trim().to_lowercase();

    let mut best: Option<&'static FallbackEntry> = None;
    let mut best_score = 0;
    for entry in entries() {
        let score = entry.score(&text);
        if score > best_score {
            best_score = score;
            best = Some(entry);
        }
    }
    best.unwrap_or_else(default_entry)
}
